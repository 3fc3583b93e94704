//! Composite prompts
//!
//! Every generation request is a fixed instruction followed by the caller's
//! text. The instruction depends on what is being generated.

use crate::types::LLMMessage;

const LESSON_INSTRUCTION: &str = "Generate comprehensive educational information and lesson content based on this input. Provide detailed explanations, examples, and structured learning material";

const QUIZ_INSTRUCTION: &str = "Based on the following lesson content, generate exactly 5 multiple choice quiz questions. For each question, provide 4 options (A, B, C, D) and clearly indicate the correct answer. Format as follows:\n\nQuestion 1: [question text]\nA) [option A]\nB) [option B]\nC) [option C]\nD) [option D]\nCorrect Answer: [letter]\n\nLesson content";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Lesson,
    Quiz,
}

impl PromptKind {
    pub fn instruction(&self) -> &'static str {
        match self {
            PromptKind::Lesson => LESSON_INSTRUCTION,
            PromptKind::Quiz => QUIZ_INSTRUCTION,
        }
    }

    /// Name of the JSON field the generated text is returned under.
    pub fn response_field(&self) -> &'static str {
        match self {
            PromptKind::Lesson => "lesson",
            PromptKind::Quiz => "quizzes",
        }
    }
}

/// Instruction plus subject text. Built once per request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositePrompt {
    instruction: &'static str,
    subject: String,
}

impl CompositePrompt {
    pub fn new(kind: PromptKind, subject: impl Into<String>) -> Self {
        Self {
            instruction: kind.instruction(),
            subject: subject.into(),
        }
    }

    pub fn instruction(&self) -> &str {
        self.instruction
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn text(&self) -> String {
        format!("{}: {}", self.instruction, self.subject)
    }

    /// The instruction as a system message, the subject as the user message.
    /// Backends that want one prompt string flatten this back to `text()`.
    pub fn as_split_messages(&self) -> Vec<LLMMessage> {
        vec![
            LLMMessage::system(self.instruction),
            LLMMessage::user(self.subject.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_text() {
        let prompt = CompositePrompt::new(PromptKind::Lesson, "photosynthesis");
        assert!(prompt.text().starts_with("Generate comprehensive educational information"));
        assert!(prompt.text().ends_with(": photosynthesis"));
    }

    #[test]
    fn test_quiz_instruction_format() {
        let instruction = PromptKind::Quiz.instruction();
        assert!(instruction.contains("exactly 5 multiple choice"));
        assert!(instruction.contains("Correct Answer: [letter]"));
        assert!(instruction.ends_with("Lesson content"));
    }

    #[test]
    fn test_split_messages() {
        let prompt = CompositePrompt::new(PromptKind::Quiz, "cells divide");
        let messages = prompt.as_split_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, PromptKind::Quiz.instruction());
        assert_eq!(messages[1], LLMMessage::user("cells divide"));
    }

    #[test]
    fn test_split_messages_flatten_to_text() {
        let prompt = CompositePrompt::new(PromptKind::Lesson, "rust");
        let request = crate::types::LLMRequest {
            model: String::new(),
            messages: prompt.as_split_messages(),
            max_tokens: None,
            temperature: None,
            top_p: None,
        };
        assert_eq!(request.prompt_text(), prompt.text());
    }

    #[test]
    fn test_response_fields() {
        assert_eq!(PromptKind::Lesson.response_field(), "lesson");
        assert_eq!(PromptKind::Quiz.response_field(), "quizzes");
    }
}
