use serde::Serialize;
use std::collections::HashSet;

/// Keeps only the named keys of each object. Empty `fields` keeps everything.
pub fn filter_fields(mut rows: Vec<serde_json::Value>, fields: &[String]) -> Vec<serde_json::Value> {
    if fields.is_empty() {
        return rows;
    }
    let want: HashSet<String> = fields.iter().map(|s| s.to_lowercase()).collect();
    for row in rows.iter_mut() {
        if let Some(obj) = row.as_object_mut() {
            obj.retain(|k, _| want.contains(&k.to_lowercase()));
        }
    }
    rows
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
