use crate::error::AppError;
use crate::store::{ResourceType, UserKind};

const MAX_LEN: usize = 50;

/// Namespace is always upper-cased, trimmed, capped at 50 chars.
pub fn namespace(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_LEN {
        return Err(AppError::InvalidNamespace(format!(
            "namespace must be 1-{MAX_LEN} characters"
        )));
    }
    Ok(trimmed.to_uppercase())
}

/// Role and resource_type are lower-cased, trimmed, capped at 50 chars.
pub fn role(raw: &str) -> Result<String, AppError> {
    bounded_lower(raw, "role")
}

pub fn user_id(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_LEN {
        return Err(AppError::BadRequest(format!(
            "user_id must be 1-{MAX_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub fn resource_type(raw: &str) -> Result<ResourceType, AppError> {
    ResourceType::parse(raw)
        .ok_or_else(|| AppError::BadRequest(format!("unknown resource_type: {raw}")))
}

pub fn user_type(raw: Option<&str>) -> UserKind {
    raw.and_then(UserKind::parse).unwrap_or_default()
}

/// Trims and de-duplicates, preserving first occurrence.
pub fn child_resource_ids(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

fn bounded_lower(raw: &str, field: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_LEN {
        return Err(AppError::BadRequest(format!(
            "{field} must be 1-{MAX_LEN} characters"
        )));
    }
    Ok(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_uppercases_and_trims() {
        assert_eq!(namespace("  ns1 ").unwrap(), "NS1");
    }

    #[test]
    fn namespace_rejects_empty() {
        assert!(namespace("   ").is_err());
    }

    #[test]
    fn namespace_rejects_over_length() {
        let long = "a".repeat(51);
        assert!(namespace(&long).is_err());
    }

    #[test]
    fn child_ids_dedupe_preserving_order() {
        let input = vec!["w1".to_string(), " w2 ".to_string(), "w1".to_string(), "".to_string()];
        assert_eq!(child_resource_ids(&input), vec!["w1".to_string(), "w2".to_string()]);
    }
}
