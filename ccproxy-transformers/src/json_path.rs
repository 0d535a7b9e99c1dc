#![allow(clippy::collapsible_if)]
//! JSONPath-subset engine backing [`crate::generic::RequestBodyTransformer`]
//! (§4.9, §9's "small JSONPath subset... field access, array index,
//! wildcard"). Core read/write helpers adapted from the client SDK this
//! workspace's core crate is grounded on; wildcard support and the
//! append/prepend/merge operations are this crate's own addition, since the
//! gateway's `RequestBodyTransformer` needs them and the source helper
//! didn't.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
    Wildcard,
}

/// Parse a dotted/array path like `a.b[0].c[*]` into segments.
pub fn parse_path(path: &str) -> Vec<PathSeg> {
    let mut segs = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }
        let mut key = String::new();
        let mut chars = part.chars().peekable();
        while let Some(&ch) = chars.peek() {
            if ch == '[' {
                break;
            }
            key.push(ch);
            chars.next();
        }
        if !key.is_empty() {
            segs.push(PathSeg::Key(key.clone()));
        }
        while let Some(&ch) = chars.peek() {
            if ch != '[' {
                break;
            }
            chars.next();
            let mut token = String::new();
            while let Some(&d) = chars.peek() {
                if d == ']' {
                    break;
                }
                token.push(d);
                chars.next();
            }
            let _ = chars.next();
            if token == "*" {
                segs.push(PathSeg::Wildcard);
            } else if let Ok(idx) = token.parse::<usize>() {
                segs.push(PathSeg::Index(idx));
            }
        }
    }
    segs
}

/// Construction-time validation: a path is well-formed if parsing it
/// yields at least one segment and the raw string contains no unmatched
/// brackets.
pub fn validate_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    let open = path.matches('[').count();
    let close = path.matches(']').count();
    open == close && !parse_path(path).is_empty()
}

pub fn get_path<'a>(v: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = v;
    for seg in parse_path(path) {
        match (seg, cur) {
            (PathSeg::Key(k), Value::Object(map)) => cur = map.get(&k)?,
            (PathSeg::Index(i), Value::Array(arr)) => cur = arr.get(i)?,
            _ => return None,
        }
    }
    Some(cur)
}

/// Read variant that fans out over `[*]` segments, collecting every match.
pub fn get_path_all<'a>(v: &'a Value, path: &str) -> Vec<&'a Value> {
    let segs = parse_path(path);
    let mut frontier = vec![v];
    for seg in segs {
        let mut next = Vec::new();
        for node in frontier {
            match (&seg, node) {
                (PathSeg::Key(k), Value::Object(map)) => {
                    if let Some(val) = map.get(k) {
                        next.push(val);
                    }
                }
                (PathSeg::Index(i), Value::Array(arr)) => {
                    if let Some(val) = arr.get(*i) {
                        next.push(val);
                    }
                }
                (PathSeg::Wildcard, Value::Array(arr)) => next.extend(arr.iter()),
                (PathSeg::Wildcard, Value::Object(map)) => next.extend(map.values()),
                _ => {}
            }
        }
        frontier = next;
    }
    frontier
}

pub fn get_path_mut<'a>(v: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let segs = parse_path(path);
    let mut cur = v;
    for seg in segs {
        match seg {
            PathSeg::Key(k) => match cur {
                Value::Object(map) => cur = map.get_mut(&k)?,
                _ => return None,
            },
            PathSeg::Index(i) => match cur {
                Value::Array(arr) => cur = arr.get_mut(i)?,
                _ => return None,
            },
            PathSeg::Wildcard => return None,
        }
    }
    Some(cur)
}

/// Write variant that fans out over `[*]`, applying `f` to every match.
/// Paths with a wildcard cannot create missing intermediate structure (the
/// fan-out has nothing to iterate if the array doesn't already exist).
pub fn for_each_path_mut(v: &mut Value, path: &str, mut f: impl FnMut(&mut Value)) {
    let segs = parse_path(path);
    fn walk(node: &mut Value, segs: &[PathSeg], f: &mut dyn FnMut(&mut Value)) {
        match segs.split_first() {
            None => f(node),
            Some((PathSeg::Key(k), rest)) => {
                if let Value::Object(map) = node {
                    if let Some(child) = map.get_mut(k) {
                        walk(child, rest, f);
                    }
                }
            }
            Some((PathSeg::Index(i), rest)) => {
                if let Value::Array(arr) = node {
                    if let Some(child) = arr.get_mut(*i) {
                        walk(child, rest, f);
                    }
                }
            }
            Some((PathSeg::Wildcard, rest)) => match node {
                Value::Array(arr) => {
                    for child in arr.iter_mut() {
                        walk(child, rest, f);
                    }
                }
                Value::Object(map) => {
                    for child in map.values_mut() {
                        walk(child, rest, f);
                    }
                }
                _ => {}
            },
        }
    }
    walk(v, &segs, &mut f);
}

pub fn ensure_parent_object<'a>(v: &'a mut Value, path: &str) -> Option<&'a mut serde_json::Map<String, Value>> {
    let segs = parse_path(path);
    if segs.is_empty() {
        return None;
    }
    let parent_segs = &segs[..segs.len() - 1];

    let mut cur = v;
    for (idx, seg) in parent_segs.iter().enumerate() {
        let next = parent_segs.get(idx + 1);
        match seg {
            PathSeg::Key(k) => {
                match cur {
                    Value::Null => *cur = Value::Object(serde_json::Map::new()),
                    Value::Object(_) => {}
                    _ => return None,
                }
                if let Value::Object(map) = cur {
                    let entry = map.entry(k.clone()).or_insert(Value::Null);
                    match next {
                        Some(PathSeg::Index(_)) => {
                            if !entry.is_array() {
                                *entry = Value::Array(Vec::new());
                            }
                        }
                        Some(PathSeg::Key(_)) | None | Some(PathSeg::Wildcard) => {
                            if !entry.is_object() {
                                *entry = Value::Object(serde_json::Map::new());
                            }
                        }
                    }
                    cur = entry;
                }
            }
            PathSeg::Index(i) => {
                match cur {
                    Value::Null => *cur = Value::Array(Vec::new()),
                    Value::Array(_) => {}
                    _ => return None,
                }
                if let Value::Array(arr) = cur {
                    if arr.len() <= *i {
                        arr.resize(i + 1, Value::Null);
                    }
                    match next {
                        Some(PathSeg::Index(_)) => {
                            if !arr[*i].is_array() {
                                arr[*i] = Value::Array(Vec::new());
                            }
                        }
                        Some(PathSeg::Key(_)) | None | Some(PathSeg::Wildcard) => {
                            if !arr[*i].is_object() {
                                arr[*i] = Value::Object(serde_json::Map::new());
                            }
                        }
                    }
                    cur = &mut arr[*i];
                }
            }
            PathSeg::Wildcard => return None,
        }
    }

    match cur {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn leaf_key(path: &str) -> Option<String> {
    match parse_path(path).pop()? {
        PathSeg::Key(k) => Some(k),
        _ => None,
    }
}

pub fn set_path(body: &mut Value, path: &str, value: Value) {
    if path.contains("[*]") {
        for_each_path_mut(body, path, |_| {});
        // Wildcard `set` targets the element itself, not a field within it.
        let segs = parse_path(path);
        set_wildcard(body, &segs, value);
        return;
    }
    if let Some(parent) = ensure_parent_object(body, path) {
        if let Some(leaf) = leaf_key(path) {
            parent.insert(leaf, value);
        }
    }
}

fn set_wildcard(node: &mut Value, segs: &[PathSeg], value: Value) {
    match segs.split_first() {
        None => *node = value,
        Some((PathSeg::Wildcard, rest)) if rest.is_empty() => {
            if let Value::Array(arr) = node {
                for item in arr.iter_mut() {
                    *item = value.clone();
                }
            }
        }
        Some((PathSeg::Key(k), rest)) => {
            if let Value::Object(map) = node {
                if let Some(child) = map.get_mut(k) {
                    set_wildcard(child, rest, value);
                }
            }
        }
        Some((PathSeg::Index(i), rest)) => {
            if let Value::Array(arr) = node {
                if let Some(child) = arr.get_mut(*i) {
                    set_wildcard(child, rest, value);
                }
            }
        }
        Some((PathSeg::Wildcard, rest)) => {
            if let Value::Array(arr) = node {
                for child in arr.iter_mut() {
                    set_wildcard(child, rest, value.clone());
                }
            }
        }
    }
}

pub fn drop_field(body: &mut Value, field: &str) {
    let segs = parse_path(field);
    if segs.is_empty() {
        return;
    }
    if segs.len() == 1 {
        match (&segs[0], body) {
            (PathSeg::Key(k), Value::Object(map)) => {
                map.remove(k);
            }
            (PathSeg::Index(i), Value::Array(arr)) => {
                if *i < arr.len() {
                    arr.remove(*i);
                }
            }
            _ => {}
        }
        return;
    }
    let mut parent = String::new();
    for (idx, seg) in segs.iter().enumerate() {
        if idx == segs.len() - 1 {
            break;
        }
        match seg {
            PathSeg::Key(k) => {
                if !parent.is_empty() {
                    parent.push('.');
                }
                parent.push_str(k);
            }
            PathSeg::Index(i) => {
                parent.push('[');
                parent.push_str(&i.to_string());
                parent.push(']');
            }
            PathSeg::Wildcard => parent.push_str("[*]"),
        }
    }
    if parent.contains("[*]") {
        let last = segs.last().unwrap().clone();
        for_each_path_mut(body, &parent, |node| {
            match (&last, node) {
                (PathSeg::Key(k), Value::Object(map)) => {
                    map.remove(k);
                }
                (PathSeg::Index(i), Value::Array(arr)) => {
                    if *i < arr.len() {
                        arr.remove(*i);
                    }
                }
                _ => {}
            }
        });
        return;
    }
    if let Some(p) = get_path_mut(body, &parent) {
        match (segs.last().unwrap(), p) {
            (PathSeg::Key(k), Value::Object(map)) => {
                map.remove(k);
            }
            (PathSeg::Index(i), Value::Array(arr)) => {
                if *i < arr.len() {
                    arr.remove(*i);
                }
            }
            _ => {}
        }
    }
}

/// Append to an array at `path`, creating it if absent.
pub fn append_path(body: &mut Value, path: &str, value: Value) {
    if let Some(target) = get_path_mut(body, path) {
        if let Value::Array(arr) = target {
            arr.push(value);
            return;
        }
    }
    if let Some(parent) = ensure_parent_object(body, path) {
        if let Some(leaf) = leaf_key(path) {
            let entry = parent.entry(leaf).or_insert(Value::Array(Vec::new()));
            if let Value::Array(arr) = entry {
                arr.push(value);
            }
        }
    }
}

/// Prepend to an array at `path`, creating it if absent.
pub fn prepend_path(body: &mut Value, path: &str, value: Value) {
    if let Some(target) = get_path_mut(body, path) {
        if let Value::Array(arr) = target {
            arr.insert(0, value);
            return;
        }
    }
    if let Some(parent) = ensure_parent_object(body, path) {
        if let Some(leaf) = leaf_key(path) {
            let entry = parent.entry(leaf).or_insert(Value::Array(Vec::new()));
            if let Value::Array(arr) = entry {
                arr.insert(0, value);
            }
        }
    }
}

/// Shallow-merge an object into the object at `path` (creating it if
/// absent); merging a non-object `value` into a non-object target replaces it.
pub fn merge_path(body: &mut Value, path: &str, value: Value) {
    if let Some(target) = get_path_mut(body, path) {
        match (target, &value) {
            (Value::Object(existing), Value::Object(incoming)) => {
                for (k, v) in incoming {
                    existing.insert(k.clone(), v.clone());
                }
                return;
            }
            (target, _) => {
                *target = value;
                return;
            }
        }
    }
    if let Some(parent) = ensure_parent_object(body, path) {
        if let Some(leaf) = leaf_key(path) {
            parent.insert(leaf, value);
        }
    }
}

pub fn apply_default(body: &mut Value, field: &str, value: Value) {
    let exists_and_non_null = get_path(body, field).map(|v| !v.is_null()).unwrap_or(false);
    if !exists_and_non_null {
        if let Some(parent) = ensure_parent_object(body, field) {
            if let Some(leaf) = leaf_key(field) {
                parent.insert(leaf, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parse_mixed_path() {
        let segs = parse_path("a.b[2].c[0][1]");
        assert!(matches!(&segs[0], PathSeg::Key(k) if k == "a"));
        assert!(matches!(&segs[1], PathSeg::Key(k) if k == "b"));
        assert!(matches!(segs[2], PathSeg::Index(2)));
        assert!(matches!(&segs[3], PathSeg::Key(k) if k == "c"));
        assert!(matches!(segs[4], PathSeg::Index(0)));
        assert!(matches!(segs[5], PathSeg::Index(1)));
    }

    #[test]
    fn wildcard_parses_as_segment() {
        let segs = parse_path("tools[*].description");
        assert_eq!(segs, vec![PathSeg::Key("tools".into()), PathSeg::Wildcard, PathSeg::Key("description".into())]);
    }

    #[test]
    fn set_path_creates_nested_object() {
        let mut v = json!({});
        set_path(&mut v, "a.b.c", json!(1));
        assert_eq!(v["a"]["b"]["c"], json!(1));
    }

    #[test]
    fn drop_field_removes_array_element() {
        let mut v = json!({"tools": [{"name":"a"},{"name":"b"}]});
        drop_field(&mut v, "tools[0]");
        assert_eq!(v["tools"].as_array().unwrap().len(), 1);
        assert_eq!(v["tools"][0]["name"], "b");
    }

    #[test]
    fn wildcard_set_rewrites_every_element_field() {
        let mut v = json!({"tools": [{"name":"a","description":"x"},{"name":"b","description":"y"}]});
        set_path(&mut v, "tools[*].description", json!("replaced"));
        assert_eq!(v["tools"][0]["description"], "replaced");
        assert_eq!(v["tools"][1]["description"], "replaced");
    }

    #[test]
    fn append_creates_missing_array() {
        let mut v = json!({});
        append_path(&mut v, "items", json!("x"));
        append_path(&mut v, "items", json!("y"));
        assert_eq!(v["items"], json!(["x", "y"]));
    }

    #[test]
    fn merge_shallow_merges_objects() {
        let mut v = json!({"metadata": {"a": 1}});
        merge_path(&mut v, "metadata", json!({"b": 2}));
        assert_eq!(v["metadata"], json!({"a": 1, "b": 2}));
    }

    #[test]
    fn get_path_all_collects_wildcard_matches() {
        let v = json!({"tools": [{"name":"a"},{"name":"b"}]});
        let names: Vec<_> = get_path_all(&v, "tools[*].name").into_iter().map(|x| x.as_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    proptest! {
        #[test]
        fn prop_default_any_index_creates_structure(i in 0usize..8) {
            let mut v = json!({});
            let path = format!("root.items[{}].flag", i);
            apply_default(&mut v, &path, json!(true));
            let got = get_path(&v, &path).and_then(|x| x.as_bool()).unwrap_or(false);
            prop_assert!(got);
        }

        #[test]
        fn prop_drop_field_missing_path_is_noop(j in 0usize..4) {
            let mut v = json!({});
            let field = format!("missing[{}].value", j);
            drop_field(&mut v, &field);
            prop_assert!(v.as_object().unwrap().is_empty());
        }
    }
}
