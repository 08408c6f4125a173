use crate::core::errors::CoreError;
use crate::schemas::analysis::{ExerciseQuestion, ExerciseSet};

const MAX_STATEMENT_CHARS: usize = 500;
const MAX_EXPLANATION_CHARS: usize = 1000;
const MAX_OPTION_CHARS: usize = 200;

/// Validates an edited exercise payload before it is persisted.
///
/// Rules run in a fixed order and the first violation wins, so the caller
/// always gets one deterministic message for a given payload. On success the
/// parsed set is returned so the caller stores a normalized document rather
/// than the raw input.
pub fn validate_exercises(payload: &serde_json::Value) -> Result<ExerciseSet, CoreError> {
    // Rule 1: the payload must have the exercise-set shape at all.
    let set: ExerciseSet = serde_json::from_value(payload.clone())
        .map_err(|e| CoreError::validation(format!("exercises payload is malformed: {e}")))?;

    if set.questions.is_empty() {
        return Err(CoreError::validation("exercises must contain at least one question"));
    }

    for (idx, question) in set.questions.iter().enumerate() {
        validate_question(idx, question)?;
    }

    Ok(set)
}

fn validate_question(idx: usize, question: &ExerciseQuestion) -> Result<(), CoreError> {
    let n = idx + 1;

    // Rule 2: required fields, bounded lengths.
    if question.statement.trim().is_empty() {
        return Err(CoreError::validation(format!("question {n}: statement must not be empty")));
    }
    if question.statement.chars().count() > MAX_STATEMENT_CHARS {
        return Err(CoreError::validation(format!(
            "question {n}: statement exceeds {MAX_STATEMENT_CHARS} characters"
        )));
    }
    if question.explanation.trim().is_empty() {
        return Err(CoreError::validation(format!(
            "question {n}: explanation must not be empty"
        )));
    }
    if question.explanation.chars().count() > MAX_EXPLANATION_CHARS {
        return Err(CoreError::validation(format!(
            "question {n}: explanation exceeds {MAX_EXPLANATION_CHARS} characters"
        )));
    }
    for option in &question.options {
        if option.text.trim().is_empty() {
            return Err(CoreError::validation(format!(
                "question {n}: option {} text must not be empty",
                option.label
            )));
        }
        if option.text.chars().count() > MAX_OPTION_CHARS {
            return Err(CoreError::validation(format!(
                "question {n}: option {} text exceeds {MAX_OPTION_CHARS} characters",
                option.label
            )));
        }
    }

    // Rule 3: exactly four options.
    if question.options.len() != 4 {
        return Err(CoreError::validation(format!(
            "question {n}: expected exactly 4 options, got {}",
            question.options.len()
        )));
    }

    // Rule 4: exactly one correct option.
    let correct = question.options.iter().filter(|o| o.correct).count();
    if correct != 1 {
        return Err(CoreError::validation(format!(
            "question {n}: expected exactly 1 correct option, got {correct}"
        )));
    }

    // Rule 5: labels are exactly the set {A, B, C, D}; presentation order is
    // the client's concern.
    let labels: Vec<&str> = question.options.iter().map(|o| o.label.as_str()).collect();
    let mut sorted = labels.clone();
    sorted.sort_unstable();
    if sorted != ["A", "B", "C", "D"] {
        return Err(CoreError::validation(format!(
            "question {n}: option labels must be A, B, C, D, got {}",
            labels.join(", ")
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(options: serde_json::Value) -> serde_json::Value {
        json!({
            "statement": "What is 2 + 2?",
            "explanation": "Basic addition.",
            "options": options,
        })
    }

    fn set(options: serde_json::Value) -> serde_json::Value {
        json!({ "questions": [question(options)] })
    }

    fn standard_options() -> serde_json::Value {
        json!([
            {"label": "A", "text": "3"},
            {"label": "B", "text": "4", "correct": true},
            {"label": "C", "text": "5"},
            {"label": "D", "text": "22"},
        ])
    }

    fn validation_message(payload: &serde_json::Value) -> String {
        match validate_exercises(payload) {
            Err(CoreError::ValidationFailed(msg)) => msg,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn valid_payload_passes() {
        let set = validate_exercises(&set(standard_options())).unwrap();
        assert_eq!(set.questions.len(), 1);
        assert_eq!(set.questions[0].options[1].label, "B");
    }

    #[test]
    fn malformed_payload_is_rule_one() {
        let msg = validation_message(&json!({"items": []}));
        assert!(msg.starts_with("exercises payload is malformed"), "{msg}");
    }

    #[test]
    fn empty_question_list_rejected() {
        let msg = validation_message(&json!({"questions": []}));
        assert_eq!(msg, "exercises must contain at least one question");
    }

    #[test]
    fn overlong_statement_rejected() {
        let mut payload = set(standard_options());
        payload["questions"][0]["statement"] = json!("x".repeat(501));
        assert_eq!(
            validation_message(&payload),
            "question 1: statement exceeds 500 characters"
        );
    }

    #[test]
    fn statement_at_limit_passes() {
        let mut payload = set(standard_options());
        payload["questions"][0]["statement"] = json!("x".repeat(500));
        assert!(validate_exercises(&payload).is_ok());
    }

    #[test]
    fn three_options_rejected() {
        let payload = set(json!([
            {"label": "A", "text": "3"},
            {"label": "B", "text": "4", "correct": true},
            {"label": "C", "text": "5"},
        ]));
        assert_eq!(
            validation_message(&payload),
            "question 1: expected exactly 4 options, got 3"
        );
    }

    #[test]
    fn two_correct_options_rejected() {
        let payload = set(json!([
            {"label": "A", "text": "3", "correct": true},
            {"label": "B", "text": "4", "correct": true},
            {"label": "C", "text": "5"},
            {"label": "D", "text": "22"},
        ]));
        assert_eq!(
            validation_message(&payload),
            "question 1: expected exactly 1 correct option, got 2"
        );
    }

    #[test]
    fn zero_correct_options_rejected() {
        let payload = set(json!([
            {"label": "A", "text": "3"},
            {"label": "B", "text": "4"},
            {"label": "C", "text": "5"},
            {"label": "D", "text": "22"},
        ]));
        assert_eq!(
            validation_message(&payload),
            "question 1: expected exactly 1 correct option, got 0"
        );
    }

    #[test]
    fn shuffled_label_set_passes() {
        let payload = set(json!([
            {"label": "B", "text": "4", "correct": true},
            {"label": "D", "text": "22"},
            {"label": "A", "text": "3"},
            {"label": "C", "text": "5"},
        ]));
        assert!(validate_exercises(&payload).is_ok());
    }

    #[test]
    fn duplicate_labels_rejected() {
        let payload = set(json!([
            {"label": "A", "text": "3"},
            {"label": "A", "text": "4", "correct": true},
            {"label": "B", "text": "5"},
            {"label": "C", "text": "22"},
        ]));
        assert_eq!(
            validation_message(&payload),
            "question 1: option labels must be A, B, C, D, got A, A, B, C"
        );
    }

    #[test]
    fn wrong_label_set_rejected() {
        let payload = set(json!([
            {"label": "A", "text": "3"},
            {"label": "B", "text": "4", "correct": true},
            {"label": "C", "text": "5"},
            {"label": "E", "text": "22"},
        ]));
        assert_eq!(
            validation_message(&payload),
            "question 1: option labels must be A, B, C, D, got A, B, C, E"
        );
    }

    #[test]
    fn empty_option_text_rejected_before_count_check() {
        let payload = set(json!([
            {"label": "A", "text": ""},
            {"label": "B", "text": "4", "correct": true},
            {"label": "C", "text": "5"},
        ]));
        assert_eq!(
            validation_message(&payload),
            "question 1: option A text must not be empty"
        );
    }
}
