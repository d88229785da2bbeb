//! Candidate cleanup
//!
//! Turns a decoded sequence into the reply text: keep only the final
//! assistant turn, cap stickers, strip template leakage and echoes, and
//! fold the result onto one line.

use super::prompt::ASSISTANT_MARKER;

/// Literal sticker placeholder used in chat exports
pub const STICKER: &str = "[貼圖]";

/// Artifacts removed from every candidate, applied in order
const DENYLIST: &[&str] = &[
    "ANTER", "問：", "問題：", "入題", "回答：", "答：", "[入戲]", "ANCES", "ANS", "ANSE", "ANSION",
    "ANTS", "[檔案]", "<<SYS>>", "INSTP", "[/INST]", "INST", "[You]", "[User]", "User",
    "[Assistant]", "Assistant", "\\n:", "\\", ":", "[你]", "[我]", "[輸入]", "ERM [/D]", "ANCE ",
    "S]", "/", "(null)", "null", "[貼文]", "[照片]",
];

/// Keep at most `max` stickers, dropping the next one and everything after it
pub fn limit_stickers(text: &str, max: usize) -> String {
    let parts: Vec<&str> = text.split(STICKER).collect();
    if parts.len() > max + 1 {
        parts[..=max].join(STICKER)
    } else {
        text.to_string()
    }
}

/// Text after the last assistant marker, or all of it
fn final_turn(text: &str) -> &str {
    match text.rfind(ASSISTANT_MARKER) {
        Some(at) => &text[at + ASSISTANT_MARKER.len()..],
        None => text,
    }
}

/// Clean one decoded candidate answering `input`
pub fn clean_candidate(decoded: &str, input: &str, max_stickers: usize) -> String {
    let mut text = limit_stickers(final_turn(decoded).trim(), max_stickers);

    for artifact in DENYLIST {
        text = text.replace(artifact, "").trim().to_string();
    }

    let input = input.trim();
    if !input.is_empty() && text.contains(input) {
        text = text.replace(input, "").trim().to_string();
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
