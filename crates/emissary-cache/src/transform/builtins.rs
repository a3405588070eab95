//! Built-in transformations.

use std::ops::RangeInclusive;

use async_trait::async_trait;
use emissary_core::SharedEntity;
use rand::Rng;
use serde_json::Value;

use super::{TransformError, Transformation};

/// Leaves the entity untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl Transformation for Identity {
    fn name(&self) -> &str {
        "noop"
    }

    async fn apply(&self, _entity: &SharedEntity) -> Result<(), TransformError> {
        Ok(())
    }
}

/// Uppercases the string field `name`. Entities without a `name` pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct UppercaseName;

impl UppercaseName {
    const FIELD: &'static str = "name";
}

#[async_trait]
impl Transformation for UppercaseName {
    fn name(&self) -> &str {
        "uppercase-name"
    }

    async fn apply(&self, entity: &SharedEntity) -> Result<(), TransformError> {
        entity.with_mut(|e| match e.get_mut(Self::FIELD) {
            None | Some(Value::Null) => Ok(()),
            Some(Value::String(name)) => {
                *name = name.to_uppercase();
                Ok(())
            },
            Some(_) => Err(TransformError::InvalidField {
                field: Self::FIELD,
                expected: "a string",
            }),
        })
    }
}

/// Adds a random offset to the integer field `age`.
///
/// Entities without an `age` pass through; a non-integer `age` fails.
#[derive(Debug, Clone)]
pub struct RandomAgeOffset {
    offset: RangeInclusive<i64>,
}

impl RandomAgeOffset {
    const FIELD: &'static str = "age";

    pub fn new(offset: RangeInclusive<i64>) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> &RangeInclusive<i64> {
        &self.offset
    }
}

impl Default for RandomAgeOffset {
    fn default() -> Self {
        Self::new(25..=35)
    }
}

#[async_trait]
impl Transformation for RandomAgeOffset {
    fn name(&self) -> &str {
        "random-age"
    }

    async fn apply(&self, entity: &SharedEntity) -> Result<(), TransformError> {
        if self.offset.is_empty() {
            return Err(TransformError::other("age offset range is empty"));
        }
        let offset = rand::rng().random_range(self.offset.clone());

        entity.with_mut(|e| {
            let Some(age) = e.get_mut(Self::FIELD) else {
                return Ok(());
            };
            let current = age.as_i64().ok_or(TransformError::InvalidField {
                field: Self::FIELD,
                expected: "an integer",
            })?;
            let shifted = current
                .checked_add(offset)
                .ok_or(TransformError::Overflow { field: Self::FIELD })?;
            *age = Value::from(shifted);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emissary_core::entity_from_value;
    use serde_json::json;

    fn shared(value: Value) -> SharedEntity {
        SharedEntity::new(entity_from_value(value).unwrap())
    }

    #[tokio::test]
    async fn test_identity_is_idempotent() {
        let original = json!({"name": "simone", "age": 25, "tags": ["a"]});
        let entity = shared(original.clone());

        for _ in 0..5 {
            Identity.apply(&entity).await.unwrap();
        }

        assert_eq!(Value::Object(entity.snapshot()), original);
    }

    #[tokio::test]
    async fn test_uppercase_name() {
        let entity = shared(json!({"name": "Simone", "age": 25}));

        UppercaseName.apply(&entity).await.unwrap();

        assert_eq!(entity.snapshot()["name"], json!("SIMONE"));
        assert_eq!(entity.snapshot()["age"], json!(25));
    }

    #[tokio::test]
    async fn test_uppercase_name_rejects_non_string() {
        let entity = shared(json!({"name": 7}));

        let err = UppercaseName.apply(&entity).await.unwrap_err();

        assert!(err.to_string().contains("'name'"));
    }

    #[tokio::test]
    async fn test_uppercase_without_name_passes_through() {
        let entity = shared(json!({"age": 1}));

        UppercaseName.apply(&entity).await.unwrap();

        assert_eq!(Value::Object(entity.snapshot()), json!({"age": 1}));
    }

    #[tokio::test]
    async fn test_random_age_offset_range() {
        for _ in 0..50 {
            let entity = shared(json!({"age": 25}));
            RandomAgeOffset::default().apply(&entity).await.unwrap();

            let age = entity.snapshot()["age"].as_i64().unwrap();
            assert!((50..=60).contains(&age), "age {age} out of range");
        }
    }

    #[tokio::test]
    async fn test_random_age_rejects_non_integer() {
        let entity = shared(json!({"age": "old"}));

        let err = RandomAgeOffset::default().apply(&entity).await.unwrap_err();

        assert!(matches!(err, TransformError::InvalidField { field: "age", .. }));
    }

    #[tokio::test]
    async fn test_random_age_overflow() {
        let entity = shared(json!({"age": i64::MAX}));

        let err = RandomAgeOffset::new(1..=1).apply(&entity).await.unwrap_err();

        assert!(matches!(err, TransformError::Overflow { .. }));
    }
}
