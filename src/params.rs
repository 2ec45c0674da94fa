//! Query parameter parsing: flat key/value pairs into a structured tree,
//! plus extraction of the reserved `_`-prefixed list directives.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn indexed_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<name>[^\[]+)\[(?P<idx>\d+)\]$").expect("static pattern"))
}

/// Parse ordered `(key, value)` pairs as delivered by request decoding into
/// a parameter tree. `name[index]` keys group into a sequence ordered by the
/// numeric index; a key that reappears as a plain scalar is promoted into a
/// sequence in encounter order.
pub fn parse<I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut tree: Map<String, Value> = Map::new();
    let mut indexed: Vec<(String, u64, String)> = Vec::new();

    for (key, value) in pairs {
        if let Some(caps) = indexed_key_re().captures(&key) {
            let name = caps["name"].to_string();
            // Index digits already bounded by the pattern; huge indexes
            // saturate rather than wrap.
            let idx = caps["idx"].parse::<u64>().unwrap_or(u64::MAX);
            reserve_group(&mut tree, &name);
            indexed.push((name, idx, value));
            continue;
        }
        push_scalar(&mut tree, key, Value::String(value));
    }

    // Index order decides sequence position, not transport order.
    indexed.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    for (name, _, value) in indexed {
        push_list_item(&mut tree, name, Value::String(value));
    }
    tree
}

/// Apply the `name[index]` grouping to an already-decoded JSON object.
/// Used by the filter compiler on nested combinator maps.
pub fn expand_indexed(map: &Map<String, Value>) -> Map<String, Value> {
    let mut tree: Map<String, Value> = Map::new();
    let mut indexed: Vec<(String, u64, Value)> = Vec::new();

    for (key, value) in map {
        if let Some(caps) = indexed_key_re().captures(key) {
            let name = caps["name"].to_string();
            let idx = caps["idx"].parse::<u64>().unwrap_or(u64::MAX);
            reserve_group(&mut tree, &name);
            indexed.push((name, idx, value.clone()));
            continue;
        }
        push_scalar(&mut tree, key.clone(), value.clone());
    }

    indexed.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    for (name, _, value) in indexed {
        push_list_item(&mut tree, name, value);
    }
    tree
}

/// Pin an indexed group to its first-occurrence position in the tree; a
/// scalar already under the name keeps its slot and is promoted later.
fn reserve_group(tree: &mut Map<String, Value>, name: &str) {
    if !tree.contains_key(name) {
        tree.insert(name.to_string(), Value::Array(Vec::new()));
    }
}

fn push_scalar(tree: &mut Map<String, Value>, key: String, value: Value) {
    match tree.get_mut(&key) {
        None => {
            tree.insert(key, value);
        }
        Some(Value::Array(seq)) => seq.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

fn push_list_item(tree: &mut Map<String, Value>, key: String, value: Value) {
    match tree.get_mut(&key) {
        None => {
            tree.insert(key, Value::Array(vec![value]));
        }
        Some(Value::Array(seq)) => seq.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

/// Reserved list directives, popped out of the tree before filter
/// compilation. Coercion failures silently fall back to the defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct ListDirectives {
    pub expand: i64,
    pub num: i64,
    pub page: i64,
    pub sort: String,
    pub direction: String,
    pub search_key: String,
}

impl Default for ListDirectives {
    fn default() -> Self {
        ListDirectives {
            expand: 0,
            num: 10,
            page: 1,
            sort: String::new(),
            direction: "asc".into(),
            search_key: String::new(),
        }
    }
}

impl ListDirectives {
    pub fn pop_from(tree: &mut Map<String, Value>) -> Self {
        let d = ListDirectives::default();
        let expand = pop_int(tree, "_expand").unwrap_or(d.expand);
        let num = match pop_int(tree, "_num") {
            Some(n) if n == -1 || n >= 0 => n,
            _ => d.num,
        };
        let page = match pop_int(tree, "_page") {
            Some(p) if p >= 1 => p,
            _ => d.page,
        };
        let sort = pop_string(tree, "_sort").unwrap_or(d.sort);
        let direction = pop_string(tree, "_direction")
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or(d.direction);
        let search_key = pop_string(tree, "_search_key").unwrap_or(d.search_key);
        ListDirectives {
            expand,
            num,
            page,
            sort,
            direction,
            search_key,
        }
    }
}

fn pop_int(tree: &mut Map<String, Value>, key: &str) -> Option<i64> {
    match tree.remove(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn pop_string(tree: &mut Map<String, Value>, key: &str) -> Option<String> {
    match tree.remove(key)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_plain_keys_pass_through() {
        let tree = parse(pairs(&[("name", "alice"), ("status", "1")]));
        assert_eq!(tree["name"], json!("alice"));
        assert_eq!(tree["status"], json!("1"));
    }

    #[test]
    fn test_indexed_keys_group_by_index_order() {
        let tree = parse(pairs(&[("tag[2]", "c"), ("tag[0]", "a"), ("tag[1]", "b")]));
        assert_eq!(tree["tag"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_single_indexed_key_becomes_one_element_sequence() {
        let tree = parse(pairs(&[("tag[0]", "only")]));
        assert_eq!(tree["tag"], json!(["only"]));
    }

    #[test]
    fn test_indexed_group_keeps_first_occurrence_position() {
        let tree = parse(pairs(&[("tag[1]", "b"), ("name", "x"), ("tag[0]", "a")]));
        let keys: Vec<&str> = tree.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["tag", "name"]);
        assert_eq!(tree["tag"], json!(["a", "b"]));
    }

    #[test]
    fn test_repeated_scalar_key_promotes_to_sequence() {
        let tree = parse(pairs(&[("id", "1"), ("id", "2"), ("id", "3")]));
        assert_eq!(tree["id"], json!(["1", "2", "3"]));
    }

    #[test]
    fn test_expand_indexed_on_json_object() {
        let mut map = Map::new();
        map.insert("status[1]".into(), json!(2));
        map.insert("status[0]".into(), json!(1));
        map.insert("name".into(), json!("a"));
        let tree = expand_indexed(&map);
        assert_eq!(tree["status"], json!([1, 2]));
        assert_eq!(tree["name"], json!("a"));
    }

    #[test]
    fn test_directive_defaults() {
        let mut tree = Map::new();
        let d = ListDirectives::pop_from(&mut tree);
        assert_eq!(d, ListDirectives::default());
    }

    #[test]
    fn test_directives_popped_and_coerced() {
        let mut tree = parse(pairs(&[
            ("_num", "20"),
            ("_page", "3"),
            ("_sort", "-modified,name"),
            ("_direction", "DESC"),
            ("_search_key", "foo"),
            ("status", "1"),
        ]));
        let d = ListDirectives::pop_from(&mut tree);
        assert_eq!(d.num, 20);
        assert_eq!(d.page, 3);
        assert_eq!(d.sort, "-modified,name");
        assert_eq!(d.direction, "desc");
        assert_eq!(d.search_key, "foo");
        // Directives are removed so only filters remain.
        assert_eq!(tree.len(), 1);
        assert!(tree.contains_key("status"));
    }

    #[test]
    fn test_bad_directive_values_fall_back_to_defaults() {
        let mut tree = parse(pairs(&[("_num", "lots"), ("_page", "-2")]));
        let d = ListDirectives::pop_from(&mut tree);
        assert_eq!(d.num, 10);
        assert_eq!(d.page, 1);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_unbounded_num_preserved() {
        let mut tree = parse(pairs(&[("_num", "-1")]));
        let d = ListDirectives::pop_from(&mut tree);
        assert_eq!(d.num, -1);
    }
}
