use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};

/// A structural, hashable and totally ordered copy of a json value.
///
/// Numbers are kept by representation: integers stay integers, floats are stored by
/// their canonical bit pattern so that `-0.0` equals `0.0` and every NaN is the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(/* f64 bits */ u64),
    String(String),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn float(f: f64) -> Self {
        let f = if f == 0.0 {
            0.0
        } else if f.is_nan() {
            f64::NAN
        } else {
            f
        };
        FieldValue::Float(f.to_bits())
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl From<&Value> for FieldValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::UInt(u)
                } else {
                    FieldValue::float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::String(Clone::clone(s)),
            Value::Array(arr) => FieldValue::Array(arr.iter().map(FieldValue::from).collect()),
            Value::Object(m) => FieldValue::Object(
                m.iter()
                    .map(|(k, v)| (Clone::clone(k), FieldValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::UInt(u) => Value::from(*u),
            FieldValue::Float(bits) => Number::from_f64(f64::from_bits(*bits))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(Clone::clone(s)),
            FieldValue::Array(arr) => Value::Array(arr.iter().map(Value::from).collect()),
            FieldValue::Object(m) => Value::Object(
                m.iter()
                    .map(|(k, v)| (Clone::clone(k), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Value::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        Ok(FieldValue::from(&v))
    }
}

/// The key partitioning one sequence into independent counters.
///
/// `None` stands for the single global counter of a sequence without reference fields,
/// otherwise it maps every reference field name to the value resolved from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceValue(Option<BTreeMap<String, FieldValue>>);

impl ReferenceValue {
    pub fn none() -> Self {
        Self(None)
    }

    /// Resolve every field against the document, missing fields become [`FieldValue::Null`].
    pub fn derive<'a, I>(doc: &Value, fields: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        fields
            .into_iter()
            .map(|field| {
                let v = tally_util::resolve_path(doc, field)
                    .map(FieldValue::from)
                    .unwrap_or(FieldValue::Null);
                (field.to_string(), v)
            })
            .collect()
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.as_ref().and_then(|m| m.get(field))
    }
}

impl FromIterator<(String, FieldValue)> for ReferenceValue {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(Some(iter.into_iter().collect()))
    }
}

impl Display for ReferenceValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "<invalid>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn init() {
        pretty_env_logger::try_init_timed().ok();
    }

    #[test]
    fn test_derive() {
        init();

        let doc = json!({"country": "FR", "city": "Paris", "parent": {"nested": 3}});

        let a = ReferenceValue::derive(&doc, ["city", "country"]);
        let b = ReferenceValue::derive(&doc, ["country", "city"]);
        assert_eq!(a, b);
        assert_eq!(Some(&FieldValue::String("FR".into())), a.get("country"));

        let c = ReferenceValue::derive(&doc, ["parent.nested", "missing"]);
        assert_eq!(Some(&FieldValue::Int(3)), c.get("parent.nested"));
        assert_eq!(Some(&FieldValue::Null), c.get("missing"));

        info!("reference: {}", &c);
    }

    #[test]
    fn test_no_string_collision() {
        init();

        // concatenated keys would give "ab" + "c" == "a" + "bc"
        let a = ReferenceValue::derive(&json!({"x": "ab", "y": "c"}), ["x", "y"]);
        let b = ReferenceValue::derive(&json!({"x": "a", "y": "bc"}), ["x", "y"]);
        assert_ne!(a, b);

        let a = ReferenceValue::derive(&json!({"x": 1}), ["x"]);
        let b = ReferenceValue::derive(&json!({"x": "1"}), ["x"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_float_canonical() {
        init();

        assert_eq!(FieldValue::float(0.0), FieldValue::float(-0.0));
        assert_eq!(FieldValue::float(f64::NAN), FieldValue::float(-f64::NAN));
        assert_ne!(FieldValue::float(1.5), FieldValue::Int(1));
    }

    #[test]
    fn test_serde() -> anyhow::Result<()> {
        init();

        let r = ReferenceValue::derive(&json!({"country": "FR", "n": 1.5}), ["country", "n"]);
        let s = serde_json::to_string(&r)?;
        assert_eq!(r#"{"country":"FR","n":1.5}"#, &s);
        assert_eq!(r, serde_json::from_str::<ReferenceValue>(&s)?);

        assert_eq!("null", serde_json::to_string(&ReferenceValue::none())?);
        assert!(serde_json::from_str::<ReferenceValue>("null")?.is_none());

        Ok(())
    }
}
