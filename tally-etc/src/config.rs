use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use garde::Validate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_INC_FIELD: &str = "_id";
pub const DEFAULT_COLLECTION_NAME: &str = "counters";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
pub struct Config {
    /// Sequences to attach, keyed by model name.
    #[serde(default)]
    #[garde(dive)]
    pub sequences: HashMap<String, Vec<SequenceOptions>>,
    #[serde(default)]
    #[garde(dive)]
    pub retry: RetryOptions,
}

impl Config {
    pub fn from_yaml(s: &str) -> Result<Self> {
        let c = serde_yaml::from_str::<Config>(s)?;
        if let Err(e) = c.validate() {
            bail!("invalid configuration: {}", e);
        }
        Ok(c)
    }

    pub fn from_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)?;
        let c = Self::from_yaml(&s)?;
        debug!(
            "load configuration from '{}' ok: {} models",
            path.display(),
            c.sequences.len()
        );
        Ok(c)
    }
}

/// Reference fields may be written as a single field or a list of fields.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum ReferenceFields {
    One(String),
    Many(Vec<String>),
}

impl ReferenceFields {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ReferenceFields::One(one) => vec![one],
            ReferenceFields::Many(many) => many,
        }
    }
}

impl From<&str> for ReferenceFields {
    fn from(value: &str) -> Self {
        ReferenceFields::One(value.to_string())
    }
}

impl<S> From<Vec<S>> for ReferenceFields
where
    S: Into<String>,
{
    fn from(value: Vec<S>) -> Self {
        ReferenceFields::Many(value.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct SequenceOptions {
    /// The field receiving the allocated value, dotted paths allowed.
    #[garde(length(min = 1))]
    pub inc_field: String,
    /// The id of the sequence, falls back to `inc_field`. Mandatory with reference fields.
    #[garde(skip)]
    pub id: Option<String>,
    #[garde(skip)]
    pub reference_fields: Option<ReferenceFields>,
    #[garde(skip)]
    pub disable_hooks: bool,
    #[garde(length(min = 1))]
    pub collection_name: String,
    /// Set false to share the same sequence id between multiple schemas.
    #[garde(skip)]
    pub exclusive: bool,
    #[garde(skip)]
    pub parallel_hooks: bool,
    #[garde(skip)]
    pub start_seq: i64,
    #[garde(range(min = 1))]
    pub inc_amount: i64,
}

impl SequenceOptions {
    pub fn new<S>(inc_field: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            inc_field: inc_field.into(),
            ..Default::default()
        }
    }
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self {
            inc_field: DEFAULT_INC_FIELD.to_string(),
            id: None,
            reference_fields: None,
            disable_hooks: false,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            exclusive: true,
            parallel_hooks: true,
            start_seq: 1,
            inc_amount: 1,
        }
    }
}

/// Bounds the retry of the increment phase when a freshly seeded counter is not visible yet.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Validate)]
#[serde(default)]
pub struct RetryOptions {
    #[garde(skip)]
    pub attempts: u32,
    #[garde(length(min = 1))]
    pub backoff: String,
}

impl RetryOptions {
    pub fn backoff(&self) -> Result<Duration> {
        duration_str::parse(&self.backoff)
            .map_err(|e| anyhow!("invalid retry backoff '{}': {}", &self.backoff, e))
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: "1ms".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        pretty_env_logger::try_init_timed().ok();
    }

    #[test]
    fn test_defaults() {
        init();

        let opts = serde_yaml::from_str::<SequenceOptions>("inc_field: id").unwrap();
        assert_eq!("id", &opts.inc_field);
        assert_eq!(None, opts.id);
        assert_eq!(None, opts.reference_fields);
        assert_eq!("counters", &opts.collection_name);
        assert!(opts.exclusive);
        assert!(opts.parallel_hooks);
        assert!(!opts.disable_hooks);
        assert_eq!(1, opts.start_seq);
        assert_eq!(1, opts.inc_amount);

        let opts = SequenceOptions::default();
        assert_eq!("_id", &opts.inc_field);
    }

    #[test]
    fn test_reference_fields() {
        init();

        let opts = serde_yaml::from_str::<SequenceOptions>(
            r#"
inc_field: inhabitant
id: inhabitant_counter
reference_fields: country
"#,
        )
        .unwrap();
        assert_eq!(
            Some(vec!["country".to_string()]),
            opts.reference_fields.map(ReferenceFields::into_vec)
        );

        let opts = serde_yaml::from_str::<SequenceOptions>(
            r#"
inc_field: inhabitant
id: inhabitant_counter
reference_fields: [country, city]
"#,
        )
        .unwrap();
        assert_eq!(
            Some(vec!["country".to_string(), "city".to_string()]),
            opts.reference_fields.map(ReferenceFields::into_vec)
        );
    }

    #[test]
    fn test_config() -> Result<()> {
        init();

        let c = Config::from_yaml(
            r#"
retry:
  attempts: 3
  backoff: 5ms
sequences:
  books:
    - inc_field: id
      start_seq: 100
      inc_amount: 10
  cities:
    - inc_field: inhabitant
      id: inhabitant_counter
      reference_fields: [country, city]
      parallel_hooks: false
"#,
        )?;

        assert_eq!(3, c.retry.attempts);
        assert_eq!(Duration::from_millis(5), c.retry.backoff()?);

        let books = c.sequences.get("books").unwrap();
        assert_eq!(100, books[0].start_seq);
        assert_eq!(10, books[0].inc_amount);

        let cities = c.sequences.get("cities").unwrap();
        assert!(!cities[0].parallel_hooks);

        Ok(())
    }

    #[test]
    fn test_from_file() -> Result<()> {
        init();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("tally.yaml");
        std::fs::write(
            &path,
            r#"
retry:
  attempts: 2
sequences:
  users:
    - inc_field: seq
      collection_name: user_counters
"#,
        )?;

        let c = Config::from_file(&path)?;
        assert_eq!(2, c.retry.attempts);
        assert_eq!(Duration::from_millis(1), c.retry.backoff()?);
        let users = c.sequences.get("users").unwrap();
        assert_eq!("seq", &users[0].inc_field);
        assert_eq!("user_counters", &users[0].collection_name);

        let missing = Config::from_file(dir.path().join("missing.yaml"));
        assert!(missing.is_err_and(|e| e.downcast_ref::<std::io::Error>().is_some()));

        std::fs::write(&path, "sequences:\n  users:\n    - inc_amount: 0\n")?;
        assert!(Config::from_file(&path).is_err());

        Ok(())
    }

    #[test]
    fn test_validate() {
        init();

        let bad = r#"
sequences:
  books:
    - inc_field: id
      inc_amount: 0
"#;
        assert!(Config::from_yaml(bad).is_err());

        let bad = r#"
sequences:
  books:
    - inc_field: ""
"#;
        assert!(Config::from_yaml(bad).is_err());

        let bad = RetryOptions {
            attempts: 1,
            backoff: "soon".to_string(),
        };
        assert!(bad.backoff().is_err());
    }
}
