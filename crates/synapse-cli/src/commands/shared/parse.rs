use serde::de::DeserializeOwned;

/// Parse a snake_case enum value, accepting `-` in place of `_`.
pub fn parse_enum<T>(raw: &str, field: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    let normalized = raw.trim().replace('-', "_");
    let json = format!("\"{normalized}\"");
    serde_json::from_str(&json).map_err(|error| anyhow::anyhow!("invalid {field} '{raw}': {error}"))
}

#[cfg(test)]
mod tests {
    use synapse_core::enums::{AuditAction, EntityType};

    use super::parse_enum;

    #[test]
    fn parses_snake_case_enum() {
        let action: AuditAction = parse_enum("status_changed", "action").expect("should parse");
        assert_eq!(action, AuditAction::StatusChanged);
    }

    #[test]
    fn parses_hyphenated_alias() {
        let entity: EntityType = parse_enum("test-cycle", "entity-type").expect("should parse");
        assert_eq!(entity, EntityType::TestCycle);
    }

    #[test]
    fn errors_on_invalid_enum() {
        let err = parse_enum::<EntityType>("widget", "entity-type").expect_err("should fail");
        assert!(err.to_string().contains("invalid entity-type 'widget'"));
    }
}
