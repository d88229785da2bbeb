//! Prompt assembly
//!
//! A prompt is a transcript: a few recent exchanges from one of the
//! identity's corpora, optionally some retrieved knowledge, then the new
//! input and an open `Assistant:` turn for the model to complete.

use crate::context::{CorpusStore, Retriever};

use super::chance::Chance;

/// Marker the model completes after
pub const ASSISTANT_MARKER: &str = "Assistant:";

/// Introduces retrieved knowledge to the model
const RETRIEVAL_INTRO: &str = "System: 以下是檢索到跟使用者相關內容，如果對話提及相關話題可以參考：";

/// Inputs for one prompt
pub struct PromptSources<'a> {
    pub corpora: &'a dyn CorpusStore,
    pub retriever: &'a dyn Retriever,
    /// How many of the most recent corpus rows to include
    pub sample_rows: usize,
}

impl PromptSources<'_> {
    /// Build the prompt for `input` spoken to `identity`.
    ///
    /// Corpus and retrieval failures leave their section out.
    pub fn assemble(&self, chance: &mut dyn Chance, identity: &str, input: &str) -> String {
        let mut lines = self.corpus_lines(chance, identity);

        match self.retriever.retrieve(identity, input) {
            Ok(content) if !content.trim().is_empty() => {
                lines.push(RETRIEVAL_INTRO.to_string());
                lines.push(content);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(identity, error = %e, "Retrieval failed, continuing without it"),
        }

        lines.push(format!("User: {input}"));
        lines.push(ASSISTANT_MARKER.to_string());
        lines.join("\n")
    }

    fn corpus_lines(&self, chance: &mut dyn Chance, identity: &str) -> Vec<String> {
        let corpora = match self.corpora.list_corpora(identity) {
            Ok(corpora) => corpora,
            Err(e) => {
                tracing::warn!(identity, error = %e, "Listing corpora failed");
                return Vec::new();
            }
        };
        if corpora.is_empty() {
            return Vec::new();
        }

        let corpus = &corpora[chance.pick(corpora.len())];
        let examples = match self.corpora.read_examples(corpus) {
            Ok(examples) => examples,
            Err(e) => {
                tracing::warn!(identity, corpus = %corpus.display(), error = %e, "Reading corpus failed");
                return Vec::new();
            }
        };

        let recent = &examples[examples.len().saturating_sub(self.sample_rows)..];
        recent
            .iter()
            .flat_map(|example| {
                [
                    format!("User: {}", example.input),
                    format!("{ASSISTANT_MARKER} {}", example.output),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Example, NoRetrieval};
    use crate::engine::testing::{FixedChance, FixedRetriever, MemoryCorpus};

    fn rows(n: usize) -> Vec<Example> {
        (0..n)
            .map(|i| Example {
                input: format!("q{i}"),
                output: format!("a{i}"),
            })
            .collect()
    }

    #[test]
    fn test_recent_rows_then_input() {
        let corpora = MemoryCorpus {
            corpora: vec![("7".into(), rows(8))],
        };
        let sources = PromptSources {
            corpora: &corpora,
            retriever: &NoRetrieval,
            sample_rows: 5,
        };

        let prompt = sources.assemble(&mut FixedChance::default(), "7", "吃飽沒");
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], "User: q3");
        assert_eq!(lines[9], "Assistant: a7");
        assert_eq!(lines[10], "User: 吃飽沒");
        assert_eq!(lines[11], "Assistant:");
    }

    #[test]
    fn test_picks_the_chosen_corpus() {
        let corpora = MemoryCorpus {
            corpora: vec![
                ("7".into(), vec![Example { input: "first".into(), output: "x".into() }]),
                ("7".into(), vec![Example { input: "second".into(), output: "y".into() }]),
            ],
        };
        let sources = PromptSources {
            corpora: &corpora,
            retriever: &NoRetrieval,
            sample_rows: 5,
        };
        let mut chance = FixedChance {
            pick: 1,
            ..Default::default()
        };
        let prompt = sources.assemble(&mut chance, "7", "hi there");
        assert!(prompt.starts_with("User: second\nAssistant: y\n"));
    }

    #[test]
    fn test_retrieved_content_is_introduced() {
        let corpora = MemoryCorpus::default();
        let sources = PromptSources {
            corpora: &corpora,
            retriever: &FixedRetriever("她養了一隻貓"),
            sample_rows: 5,
        };
        let prompt = sources.assemble(&mut FixedChance::default(), "7", "你的貓呢");
        assert_eq!(
            prompt,
            format!("{RETRIEVAL_INTRO}\n她養了一隻貓\nUser: 你的貓呢\nAssistant:")
        );
    }

    #[test]
    fn test_no_corpus_no_retrieval() {
        let corpora = MemoryCorpus::default();
        let sources = PromptSources {
            corpora: &corpora,
            retriever: &NoRetrieval,
            sample_rows: 5,
        };
        assert_eq!(
            sources.assemble(&mut FixedChance::default(), "7", "在嗎"),
            "User: 在嗎\nAssistant:"
        );
    }
}
