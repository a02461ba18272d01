//! Prompt templates for every generative call in the pipeline

use crate::errors::AppError;
use crate::source::Chunk;
use std::fmt;
use std::str::FromStr;

/// Delimiter placed between chunks of a multi-chunk context
pub const CONTEXT_SEPARATOR: &str = "SEPARATOR \n";

/// Chunk quality scoring. The reply must be a JSON object with two 0/1 keys.
pub fn evaluate_chunk(chunk: &str) -> String {
    format!(
        r#"Score the chunk below on two criteria. Each score is either 0 (low) or 1 (high).

- "self_containment": 1 if the chunk can be understood on its own without outside knowledge.
  Any person or organisation it mentions must be identifiable from the chunk itself.
- "not_metadata": 0 if the chunk is mostly citations, links, dates or other structural
  elements; 1 if it is mostly content.

Be strict. When unsure, score 0.

Example chunk: "Retrieved 2010-08-10. 35. T. Krovetz, W. Dai (2010). "How to get fast AES calls?" (https://groups.google.com/group/cryptopp-users). Crypto++ user group. Retrieved 2010-08-11."
Example output: {{"self_containment": 1, "not_metadata": 0}}

Example chunk: "I loved music and thought I could be very good, but I knew I would never be John Coltrane or Stan Getz."
Example output: {{"self_containment": 0, "not_metadata": 1}}

Return only a JSON object with the keys "self_containment" and "not_metadata".

Chunk:
{chunk}

Output:
"#
    )
}

/// One question grounded in a single chunk
pub fn chunk_query(chunk: &str) -> String {
    format!(
        r#"You are a curious student who asks sharp questions. Write one question that can be
answered from the passage below. A reader must be able to tell the topic of the question
without seeing the passage, so never write phrases such as "as per the context provided"
or "during the period discussed". Reply with the question only.

Example passage: "C++ supports function, class, alias, and variable templates. Templates may be parameterized by types, compile-time constants, and other templates."
Good question: "How do templates contribute to programming in C++?"
Bad question: "What templates are there?"

Passage:
{chunk}
"#
    )
}

/// One unified question that needs every chunk of a context.
/// The reply is expected as a JSON string.
pub fn context_query(context: &[Chunk]) -> String {
    let joined = context
        .iter()
        .map(|c| format!("{}\n", c.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    let count = context.len();

    format!(
        r#"You are a curious student who asks sharp questions. The context below is made of
{count} chunks separated by the word "SEPARATOR". Write a single question that can only be
answered by drawing on all {count} chunks. The question must be self-contained, unified and
concise. Never join two questions together.

Good question: "How did political structures and alliances shape relations among Greek city-states?"
Bad question (uses only the last chunk): "What alliances did Sparta form during the archaic period?"
Bad question (two questions joined): "What are the origins of the Arabs, and how did their influence evolve?"

Reply with the question as a JSON string, for example "How did ...?".

Context:
{joined}
"#
    )
}

fn numbered_chunks(chunks: &[String]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("Chunk {}: {}", i + 1, chunk))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A grounded answer touching every chunk
pub fn answer_query(query: &str, chunks: &[String]) -> String {
    format!(
        r#"You will be given a query and the chunks that hold the information needed to answer it.
Answer the query using the chunks. The answer must cover the key points of every chunk.

Reply with the answer text only, without extra formatting or commentary.

Query: {query}
{chunks}
"#,
        chunks = numbered_chunks(chunks)
    )
}

/// Split a compound query and map each part to the chunks it needs
pub fn split_compound_query(query: &str, chunks: &[String]) -> String {
    format!(
        r#"The query below contains two questions. Your task:
1. Split it into two self-contained questions (no pronouns referring to the other question).
2. For each question, list the chunks needed to answer it, by their 1-based chunk number.
3. Return a JSON object whose keys are the questions and whose values are lists of chunk numbers.

Leave out chunks a question does not need. Every chunk must be mapped to at least one question.

Example query: "How does binary counting work, and how does it differ from decimal counting?"
Example output: {{"How does binary counting work?": [2, 3, 4], "How does binary counting differ from decimal counting?": [1]}}

Return only the JSON object.

Query: {query}
{chunks}
"#,
        chunks = numbered_chunks(chunks)
    )
}

const EVOLUTION_PREAMBLE: &str = "I want you to act as an input rewriter.
Rewrite the given `Input` so that it stays factually correct according to `Context`.
You MUST complicate `Input` using the following method:";

const NO_CONTEXT_PHRASES: &str =
    "`Rewritten Input` should not contain phrases like 'based on the provided context' or 'according to the context'.";

/// Named rewriting strategy applied by the evolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvolutionStrategy {
    MultiContext,
    Reasoning,
    Concretizing,
    Generalizing,
    Constrained,
    ComparativeQuestion,
    HypotheticalScenario,
    InBreadth,
}

impl EvolutionStrategy {
    pub const ALL: [EvolutionStrategy; 8] = [
        EvolutionStrategy::MultiContext,
        EvolutionStrategy::Reasoning,
        EvolutionStrategy::Concretizing,
        EvolutionStrategy::Generalizing,
        EvolutionStrategy::Constrained,
        EvolutionStrategy::ComparativeQuestion,
        EvolutionStrategy::HypotheticalScenario,
        EvolutionStrategy::InBreadth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EvolutionStrategy::MultiContext => "multi_context_evolution",
            EvolutionStrategy::Reasoning => "reasoning_evolution",
            EvolutionStrategy::Concretizing => "concretizing_evolution",
            EvolutionStrategy::Generalizing => "generalizing_evolution",
            EvolutionStrategy::Constrained => "constrained_evolution",
            EvolutionStrategy::ComparativeQuestion => "comparative_question_evolution",
            EvolutionStrategy::HypotheticalScenario => "hypothetical_scenario_evolution",
            EvolutionStrategy::InBreadth => "in_breadth_evolution",
        }
    }

    fn rules(&self) -> String {
        match self {
            EvolutionStrategy::MultiContext => format!(
                "1. `Input` should be rewritten to require information from every element of `Context`.
2. `Rewritten Input` must be fully answerable from `Context`.
3. `Rewritten Input` should be concise and understandable by humans.
4. {NO_CONTEXT_PHRASES}
5. `Rewritten Input` should not exceed 20 words.

Example input: How do vaccines work?
Example rewritten input: How does introducing a modified pathogen prepare the immune system for future encounters?"
            ),
            EvolutionStrategy::Reasoning => format!(
                "1. If `Input` can be solved with a few simple thinking steps, rewrite it to request multiple-step reasoning.
2. `Rewritten Input` should require several logical connections or inferences.
3. `Rewritten Input` should be concise and understandable by humans.
4. {NO_CONTEXT_PHRASES}
5. `Rewritten Input` must be fully answerable from `Context`.
6. `Rewritten Input` should not exceed 15 words.

Example input: Why are plants green?
Example rewritten input: How does chlorophyll's light absorption explain both leaf colour and plant energy production?"
            ),
            EvolutionStrategy::Concretizing => format!(
                "1. Replace general concepts or inquiries in `Input` with more specific ones.
2. `Rewritten Input` should be concise and understandable by humans.
3. {NO_CONTEXT_PHRASES}
4. `Rewritten Input` must be fully answerable from `Context`.
5. `Rewritten Input` should not exceed 15 words.

Example input: How do vehicles reduce emissions?
Example rewritten input: How do catalytic converters cut nitrogen oxide emissions in petrol cars?"
            ),
            EvolutionStrategy::Generalizing => "1. Remove specific details from `Input` and replace them with general concepts.
2. `Rewritten Input` should be broad, simple, and invite a wide range of answers.
3. `Rewritten Input` should not contain overly specific terms or technical jargon.
4. Keep `Rewritten Input` an open-ended question of at most 10 words.

Example input: How does the RC5 cipher use data-dependent rotations?
Example rewritten input: How do ciphers scramble data?"
                .to_string(),
            EvolutionStrategy::Constrained => "1. Add at least one more constraint or requirement to `Input`.
2. `Rewritten Input` must be fully answerable from `Context`.
3. `Rewritten Input` should not exceed 15 words.

Example input: What are the benefits of solar power?
Example rewritten input: What are the economic benefits of residential solar power in cold climates?"
                .to_string(),
            EvolutionStrategy::ComparativeQuestion => format!(
                "1. Rewrite `Input` to compare two or more entities, concepts, or processes.
2. `Rewritten Input` should invite a detailed comparison of similarities and differences.
3. `Rewritten Input` must be fully answerable from `Context`.
4. `Rewritten Input` should be concise and understandable by humans.
5. {NO_CONTEXT_PHRASES}
6. `Rewritten Input` should not exceed 15 words.

Example input: What is a block cipher?
Example rewritten input: How do block ciphers differ from stream ciphers in handling data?"
            ),
            EvolutionStrategy::HypotheticalScenario => format!(
                "1. Rewrite `Input` around a hypothetical or speculative scenario relevant to `Context`.
2. `Rewritten Input` should ask the reader to apply `Context` to imagine or deduce outcomes.
3. `Rewritten Input` should be concise, clear, and understandable by humans.
4. {NO_CONTEXT_PHRASES}
5. `Rewritten Input` must be fully answerable from `Context`.
6. `Rewritten Input` should not exceed 15 words.

Example input: What does the ozone layer do?
Example rewritten input: What would happen to surface life if the ozone layer vanished?"
            ),
            EvolutionStrategy::InBreadth => format!(
                "1. Rewrite `Input` into a brand new prompt.
2. `Rewritten Input` should belong to the same domain as `Input` but be even more rare.
3. `Rewritten Input` should be concise, clear, and understandable by humans.
4. {NO_CONTEXT_PHRASES}
5. `Rewritten Input` should not exceed 15 words.

Example input: How do antibiotics work?
Example rewritten input: How do bacteriophages compare to antibiotics against resistant infections?"
            ),
        }
    }

    /// Full rewriting prompt for one query and its grounding text
    pub fn prompt(&self, input: &str, context: &str) -> String {
        format!(
            "{EVOLUTION_PREAMBLE}\n{rules}\n\nContext:\n{context}\nInput:\n{input}\nRewritten Input:\n",
            rules = self.rules()
        )
    }
}

impl fmt::Display for EvolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EvolutionStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvolutionStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| AppError::UnknownEvolutionStep { step: s.to_string() })
    }
}
