use anyhow::Result;
use serde_json::{Map, Value};
use smallvec::SmallVec;

/// Segments of a dotted path, e.g. `parent.nested` => `["parent", "nested"]`.
pub type Segments<'a> = SmallVec<[&'a str; 4]>;

/// Split a dotted path, skipping empty segments.
#[inline]
pub fn split_path(path: &str) -> Segments<'_> {
    path.split('.').filter(|it| !it.is_empty()).collect()
}

/// Resolve a dotted path against a json document.
///
/// Objects are walked by key and arrays by numeric index. Returns `None` as soon as
/// a segment cannot be resolved.
pub fn resolve_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = split_path(path);
    if segments.is_empty() {
        return None;
    }

    let mut cur = doc;
    for seg in segments {
        cur = match cur {
            Value::Object(m) => m.get(seg)?,
            Value::Array(arr) => arr.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

/// Assign a value at a dotted path, creating missing (or null) intermediate objects.
pub fn set_path(doc: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments = split_path(path);
    let (last, parents) = match segments.split_last() {
        Some(it) => it,
        None => bail!("cannot assign to an empty path"),
    };

    if doc.is_null() {
        *doc = Value::Object(Map::new());
    }

    let mut cur = doc;
    for seg in parents {
        cur = match cur {
            Value::Object(m) => {
                let next = m.entry(seg.to_string()).or_insert(Value::Null);
                if next.is_null() {
                    *next = Value::Object(Map::new());
                }
                next
            }
            _ => bail!("cannot assign '{}': '{}' is not an object", path, seg),
        };
    }

    match cur {
        Value::Object(m) => {
            m.insert(last.to_string(), value);
            Ok(())
        }
        _ => bail!("cannot assign '{}': parent is not an object", path),
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
    fn test_split_path() {
        init();

        assert_eq!(&split_path("a.b.c")[..], &["a", "b", "c"]);
        assert_eq!(&split_path("a..b.")[..], &["a", "b"]);
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_resolve_path() {
        init();

        let doc = json!({
            "country": "FR",
            "parent": { "nested": 42 },
            "tags": ["x", "y"],
        });

        assert_eq!(Some(&json!("FR")), resolve_path(&doc, "country"));
        assert_eq!(Some(&json!(42)), resolve_path(&doc, "parent.nested"));
        assert_eq!(Some(&json!("y")), resolve_path(&doc, "tags.1"));
        assert_eq!(None, resolve_path(&doc, "parent.missing"));
        assert_eq!(None, resolve_path(&doc, "country.code"));
        assert_eq!(None, resolve_path(&doc, ""));
    }

    #[test]
    fn test_set_path() -> Result<()> {
        init();

        let mut doc = Value::Null;
        set_path(&mut doc, "parent.nested", json!(1))?;
        set_path(&mut doc, "parent.other", json!("x"))?;
        set_path(&mut doc, "id", json!(7))?;

        log::info!("document: {}", &doc);

        assert_eq!(
            json!({"parent": {"nested": 1, "other": "x"}, "id": 7}),
            doc
        );

        assert!(set_path(&mut doc, "id.inner", json!(1)).is_err());
        assert!(set_path(&mut doc, "", json!(1)).is_err());

        Ok(())
    }
}
