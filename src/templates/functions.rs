//! Functions available to every template.
//!
//! `register_helpers` adds the stateless helpers; `register_file_access`
//! adds readers confined to one folder through [`SandboxedFs`].

use std::collections::BTreeMap;
use minijinja::value::{Rest, Value, ValueKind};
use minijinja::{Environment, Error, ErrorKind};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::content::{render_markdown, CONTENTS_KEY};
use crate::sandbox::{SandboxError, SandboxedFs};

fn invalid(msg: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, msg.into())
}

fn sandbox_error(err: SandboxError) -> Error {
    let kind = match err {
        SandboxError::PathEscape { .. } => ErrorKind::InvalidOperation,
        _ => ErrorKind::UndefinedError,
    };
    Error::new(kind, "file access failed").with_source(err)
}

/// Build a map from alternating key/value arguments.
pub fn t_dict(items: &[Value]) -> Result<Value, Error> {
    if items.len() % 2 != 0 {
        return Err(invalid("tDict requires an even number of arguments"));
    }
    let mut map = BTreeMap::new();
    for pair in items.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| invalid("tDict keys must be strings"))?;
        map.insert(key.to_string(), pair[1].clone());
    }
    Ok(Value::from_serialize(&map))
}

/// Uniform integer in `[low, high)`.
pub fn rand_range(low: i64, high: i64) -> Result<i64, Error> {
    if high <= low {
        return Err(invalid(format!("randRange needs low < high, got {low}..{high}")));
    }
    Ok(rand::thread_rng().gen_range(low..high))
}

/// Pick `n` elements from a random permutation of `items`, wrapping when
/// `n` exceeds the length. Negative `n` takes every element once.
pub fn get_n<T: Clone>(n: i64, items: &[T]) -> Vec<T> {
    if items.is_empty() {
        return Vec::new();
    }
    let count = usize::try_from(n).unwrap_or(items.len());
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.shuffle(&mut rand::thread_rng());

    (0..count)
        .map(|i| items[order[i % order.len()]].clone())
        .collect()
}

/// Replace the first `n` occurrences of `from`; negative `n` replaces all.
pub fn replace_n(s: &str, from: &str, to: &str, n: i64) -> String {
    match usize::try_from(n) {
        Ok(count) => s.replacen(from, to, count),
        Err(_) => s.replace(from, to),
    }
}

pub fn filter_contains(list: &[String], sub: &str) -> Vec<String> {
    list.iter().filter(|s| s.contains(sub)).cloned().collect()
}

fn markdown_value(value: &Value) -> String {
    match value.kind() {
        ValueKind::String => value.as_str().map(render_markdown).unwrap_or_default(),
        ValueKind::Bytes => value
            .as_bytes()
            .map(|b| render_markdown(&String::from_utf8_lossy(b)))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Register the stateless helper functions.
pub fn register_helpers(env: &mut Environment<'static>) {
    env.add_function("tDict", |items: Rest<Value>| t_dict(&items));
    env.add_function("randRange", rand_range);
    env.add_function("md", |value: Value| Value::from_safe_string(markdown_value(&value)));
    env.add_function("bSelect", |cond: bool, a: Value, b: Value| if cond { a } else { b });
    env.add_function("getN", |n: i64, seq: Value| -> Result<Value, Error> {
        let items: Vec<Value> = seq
            .try_iter()
            .map_err(|_| invalid("getN requires a sequence"))?
            .collect();
        Ok(Value::from(get_n(n, &items)))
    });
    env.add_function("contains", |s: String, sub: String| s.contains(&sub));
    env.add_function("filterContains", |list: Vec<String>, sub: String| {
        filter_contains(&list, &sub)
    });
    env.add_function("replace", |s: String, from: String, to: String, n: i64| {
        replace_n(&s, &from, &to, n)
    });
    env.add_function(
        "multiReplace",
        |list: Vec<String>, from: String, to: String, n: i64| {
            list.iter()
                .map(|s| replace_n(s, &from, &to, n))
                .collect::<Vec<_>>()
        },
    );
}

/// Register `File`, `mdFile`, `headedFile` and `headedMDFile` for `fs`.
pub fn register_file_access(env: &mut Environment<'static>, fs: SandboxedFs) {
    let files = fs.clone();
    env.add_function("File", move |name: String| {
        files.read_text(&name).map_err(sandbox_error)
    });

    let files = fs.clone();
    env.add_function("mdFile", move |name: String| {
        files
            .read_markdown(&name)
            .map(Value::from_safe_string)
            .map_err(sandbox_error)
    });

    let files = fs.clone();
    env.add_function("headedFile", move |name: String| {
        files
            .read_headed(&name)
            .map(|fields| Value::from_serialize(&fields))
            .map_err(sandbox_error)
    });

    let files = fs;
    env.add_function("headedMDFile", move |name: String| -> Result<Value, Error> {
        let mut fields = files.read_headed(&name).map_err(sandbox_error)?;
        let contents = fields
            .get(CONTENTS_KEY)
            .ok_or_else(|| invalid(format!("{name} has no contents")))?;
        let html = render_markdown(contents);
        fields.insert("md".to_string(), html);
        Ok(Value::from_serialize(&fields))
    });
}
