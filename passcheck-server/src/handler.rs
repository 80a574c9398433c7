//! Check and generate operations, independent of the HTTP binding.

use breach_verifier::BreachIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::ApiError;
use crate::generator::{self, GenerateOptions};
use crate::strength::{self, Category};

pub const BREACH_WARNING: &str =
    "⚠️ This password has been found in known data breaches. DO NOT use it.";

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub password: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CheckResponse {
    pub strength_score: u8,
    pub strength_category: Category,
    pub is_breached: bool,
    pub suggestions: Vec<String>,
}

/// Body of a generate request. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub length: Option<usize>,
    pub include_uppercase: Option<bool>,
    pub include_lowercase: Option<bool>,
    pub include_digits: Option<bool>,
    pub include_special: Option<bool>,
}

impl GenerateRequest {
    /// Fills in defaults and rejects lengths above [`generator::MAX_LENGTH`].
    pub fn into_options(self) -> Result<GenerateOptions, ApiError> {
        let defaults = GenerateOptions::default();
        let length = self.length.unwrap_or(defaults.length);
        if length > generator::MAX_LENGTH {
            return Err(ApiError::Unprocessable(format!(
                "length must be at most {}",
                generator::MAX_LENGTH
            )));
        }

        Ok(GenerateOptions {
            length,
            include_uppercase: self.include_uppercase.unwrap_or(defaults.include_uppercase),
            include_lowercase: self.include_lowercase.unwrap_or(defaults.include_lowercase),
            include_digits: self.include_digits.unwrap_or(defaults.include_digits),
            include_special: self.include_special.unwrap_or(defaults.include_special),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub generated_password: String,
    pub strength_score: u8,
    pub strength_category: Category,
}

/// Scores the password and looks it up in the breach set.
///
/// A failed lookup is an error, never "not breached".
pub async fn check(index: &BreachIndex, password: &str) -> Result<CheckResponse, ApiError> {
    let strength = strength::evaluate(password);
    let is_breached = index.contains_async(password).await.map_err(|e| {
        error!(error = %e, "breach lookup failed");
        ApiError::Unavailable(e)
    })?;

    let mut suggestions = Vec::with_capacity(strength.suggestions.len() + 1);
    if is_breached {
        suggestions.push(BREACH_WARNING.to_string());
    }
    suggestions.extend(strength.suggestions.iter().map(|s| s.to_string()));

    debug!(score = strength.score, is_breached, "checked password");
    Ok(CheckResponse {
        strength_score: strength.score,
        strength_category: strength.category,
        is_breached,
        suggestions,
    })
}

/// Generates a password and scores it.
pub fn generate(options: &GenerateOptions) -> GenerateResponse {
    let generated_password = generator::generate(options);
    let strength = strength::evaluate(&generated_password);
    GenerateResponse {
        generated_password,
        strength_score: strength.score,
        strength_category: strength.category,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_defaults() {
        let options = GenerateRequest::default().into_options().unwrap();
        assert_eq!(options, GenerateOptions::default());
    }

    #[test]
    fn test_generate_request_partial() {
        let request: GenerateRequest =
            serde_json::from_str(r#"{"length": 20, "include_special": false}"#).unwrap();
        let options = request.into_options().unwrap();
        assert_eq!(options.length, 20);
        assert!(!options.include_special);
        assert!(options.include_uppercase);
    }

    #[test]
    fn test_generate_request_rejects_huge_length() {
        let request = GenerateRequest { length: Some(generator::MAX_LENGTH + 1), ..Default::default() };
        assert!(matches!(request.into_options(), Err(ApiError::Unprocessable(_))));

        let request = GenerateRequest { length: Some(generator::MAX_LENGTH), ..Default::default() };
        assert!(request.into_options().is_ok());
    }

    #[test]
    fn test_generate_scores_its_output() {
        let response = generate(&GenerateOptions::default());
        assert_eq!(response.generated_password.len(), 12);
        assert_eq!(response.strength_score, 5);
        assert_eq!(response.strength_category, Category::Excellent);
    }
}
