//! Write-path invariant checks. Each runs before anything is written.

use crate::error::{Error, Result};
use crate::models::Question;
use chrono::NaiveDate;
use std::collections::HashSet;

pub fn require_name(entity: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation(format!("{} name must not be empty", entity)));
    }
    Ok(())
}

pub fn require_optional_name(entity: &str, name: Option<&str>) -> Result<()> {
    match name {
        Some(name) => require_name(entity, name),
        None => Ok(()),
    }
}

/// Discrete-choice questions need at least two distinct, non-blank options
pub fn validate_question(question: &Question) -> Result<()> {
    if question.id.trim().is_empty() {
        return Err(Error::validation("question id must not be empty"));
    }
    if question.text.trim().is_empty() {
        return Err(Error::validation(format!("question '{}' has no text", question.id)));
    }

    if question.kind.requires_options() {
        let distinct: HashSet<&str> = question
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .collect();
        if distinct.len() < 2 {
            return Err(Error::validation(format!(
                "question '{}' needs at least 2 distinct options, has {}",
                question.id,
                distinct.len()
            )));
        }
        if distinct.len() != question.options.len() {
            return Err(Error::validation(format!(
                "question '{}' has blank or duplicate options",
                question.id
            )));
        }
    }
    Ok(())
}

pub fn validate_questions(questions: &[Question]) -> Result<()> {
    let mut seen = HashSet::new();
    for question in questions {
        validate_question(question)?;
        if !seen.insert(question.id.as_str()) {
            return Err(Error::validation(format!("duplicate question id '{}'", question.id)));
        }
    }
    Ok(())
}

pub fn validate_date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(Error::validation(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
    }
    Ok(())
}

pub fn validate_unique_ids(field: &str, ids: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(Error::validation(format!("{} contains an empty id", field)));
        }
        if !seen.insert(id.as_str()) {
            return Err(Error::validation(format!("{} lists '{}' twice", field, id)));
        }
    }
    Ok(())
}

/// Immutable references may only be repeated with their stored value
pub fn ensure_unchanged(field: &str, current: Option<&str>, proposed: Option<&str>) -> Result<()> {
    match proposed {
        Some(proposed) if Some(proposed) != current => Err(Error::validation(format!(
            "{} is immutable (stored {:?}, got '{}')",
            field,
            current.unwrap_or(""),
            proposed
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionType;

    #[test]
    fn test_multiple_choice_needs_two_options() {
        let one = Question::new("q1", "Pick", QuestionType::MultipleChoice).with_options(["Only"]);
        assert!(matches!(validate_question(&one), Err(Error::ValidationFailed(_))));

        let dup = Question::new("q1", "Pick", QuestionType::Ranking).with_options(["A", "A", "B"]);
        assert!(validate_question(&dup).is_err());

        let ok = Question::new("q1", "Pick", QuestionType::MultipleChoice).with_options(["A", "B"]);
        assert!(validate_question(&ok).is_ok());

        let open = Question::new("q2", "Tell us more", QuestionType::OpenEnded);
        assert!(validate_question(&open).is_ok());
    }

    #[test]
    fn test_question_ids_unique() {
        let questions = vec![
            Question::new("q1", "Rate us", QuestionType::Rating),
            Question::new("q1", "Again", QuestionType::Rating),
        ];
        assert!(validate_questions(&questions).is_err());
    }

    #[test]
    fn test_immutable_field_may_repeat_current_value() {
        assert!(ensure_unchanged("clientId", Some("c1"), Some("c1")).is_ok());
        assert!(ensure_unchanged("clientId", Some("c1"), None).is_ok());
        assert!(ensure_unchanged("clientId", Some("c1"), Some("c2")).is_err());
        assert!(ensure_unchanged("brandId", None, Some("b1")).is_err());
    }

    #[test]
    fn test_date_range() {
        let may = NaiveDate::from_ymd_opt(2024, 5, 1);
        let june = NaiveDate::from_ymd_opt(2024, 6, 1);
        assert!(validate_date_range(may, june).is_ok());
        assert!(validate_date_range(june, may).is_err());
        assert!(validate_date_range(None, may).is_ok());
    }
}
