//! View evaluation.
//!
//! The server cannot run the JavaScript in a design document, so each view is backed by a
//! Rust map function registered under the application and view name. The design document
//! still decides whether the view exists and which built-in reduce (`_count`, `_sum`) applies.

use serde_json::{Value, json};
use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use crate::{
    collate::collate,
    state::{Database, Reply, is_design_id},
};

/// A map function: receives a document (with `_id` and `_rev`) and returns the emitted
/// `(key, value)` pairs.
pub type MapFn = Arc<dyn Fn(&Value) -> Vec<(Value, Value)> + Send + Sync>;

struct Row<'a> {
    id: &'a str,
    key: Value,
    value: Value,
    doc: Value,
}

#[derive(Debug, Default)]
struct ViewParams {
    key: Option<Value>,
    start_key: Option<Value>,
    end_key: Option<Value>,
    include_docs: bool,
    descending: bool,
    limit: Option<usize>,
    skip: usize,
    reduce: Option<bool>,
}

fn parse_json(params: &HashMap<String, String>, name: &str) -> Result<Option<Value>, Reply> {
    params
        .get(name)
        .map(|raw| serde_json::from_str(raw))
        .transpose()
        .map_err(|_| query_error(format!("Invalid JSON value for {name}")))
}

fn parse_value<T: std::str::FromStr>(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, Reply> {
    params
        .get(name)
        .map(|raw| raw.parse::<T>())
        .transpose()
        .map_err(|_| query_error(format!("Invalid value for {name}")))
}

fn query_error(reason: String) -> Reply {
    Reply::error(400, "query_parse_error", reason)
}

impl ViewParams {
    fn parse(params: &HashMap<String, String>) -> Result<Self, Reply> {
        Ok(Self {
            key: parse_json(params, "key")?,
            start_key: parse_json(params, "startkey")?.or(parse_json(params, "start_key")?),
            end_key: parse_json(params, "endkey")?.or(parse_json(params, "end_key")?),
            include_docs: parse_value(params, "include_docs")?.unwrap_or(false),
            descending: parse_value(params, "descending")?.unwrap_or(false),
            limit: parse_value(params, "limit")?,
            skip: parse_value(params, "skip")?.unwrap_or(0),
            reduce: parse_value(params, "reduce")?,
        })
    }

    fn in_range(&self, key: &Value) -> bool {
        if let Some(wanted) = &self.key {
            return collate(key, wanted) == Ordering::Equal;
        }

        // Descending views walk from startkey down to endkey.
        let (low, high) = if self.descending {
            (&self.end_key, &self.start_key)
        } else {
            (&self.start_key, &self.end_key)
        };

        low.as_ref().is_none_or(|low| collate(key, low) != Ordering::Less)
            && high.as_ref().is_none_or(|high| collate(key, high) != Ordering::Greater)
    }
}

/// Answers `GET`/`HEAD <db>/_design/<app>/_view/<view>`.
pub(crate) fn query_view(
    db: &Database,
    app: &str,
    view: &str,
    map: Option<&MapFn>,
    params: &HashMap<String, String>,
    head: bool,
) -> Reply {
    let Some(design) = db.live(&format!("_design/{app}")) else {
        return Reply::not_found("missing");
    };
    let Some(definition) = design.body.get("views").and_then(|views| views.get(view)) else {
        return Reply::not_found("missing_named_view");
    };
    if head {
        return Reply::ok(Value::Null);
    }

    let Some(map) = map else {
        return Reply::error(
            500,
            "unsupported",
            format!("No map function registered for {app}/{view}"),
        );
    };
    let params = match ViewParams::parse(params) {
        Ok(params) => params,
        Err(reply) => return reply,
    };

    let mut rows: Vec<Row<'_>> = Vec::new();
    for (id, doc) in &db.docs {
        if doc.deleted || is_design_id(id) {
            continue;
        }
        let value = doc.to_value(id);
        for (key, emitted) in map(&value) {
            rows.push(Row {
                id,
                key,
                value: emitted,
                doc: value.clone(),
            });
        }
    }

    rows.sort_by(|a, b| collate(&a.key, &b.key).then_with(|| a.id.cmp(b.id)));
    if params.descending {
        rows.reverse();
    }

    let total_rows = rows.len();
    let mut selected = rows
        .into_iter()
        .enumerate()
        .filter(|(_, row)| params.in_range(&row.key))
        .skip(params.skip)
        .take(params.limit.unwrap_or(usize::MAX))
        .peekable();
    let offset = selected.peek().map_or(total_rows, |(index, _)| *index);
    let selected: Vec<Row<'_>> = selected.map(|(_, row)| row).collect();

    let reduce = definition.get("reduce").and_then(Value::as_str);
    if let (Some(reduce), true) = (reduce, params.reduce.unwrap_or(true)) {
        return reduce_rows(reduce, &selected);
    }

    let rows: Vec<Value> = selected
        .into_iter()
        .map(|row| {
            let mut value = json!({ "id": row.id, "key": row.key, "value": row.value });
            if params.include_docs {
                value["doc"] = row.doc;
            }
            value
        })
        .collect();

    Reply::ok(json!({ "total_rows": total_rows, "offset": offset, "rows": rows }))
}

fn reduce_rows(reduce: &str, rows: &[Row<'_>]) -> Reply {
    let value = match reduce {
        "_count" => json!(rows.len()),
        "_sum" => json!(rows.iter().filter_map(|row| row.value.as_f64()).sum::<f64>()),
        other => {
            return Reply::error(
                500,
                "unsupported",
                format!("Reduce function {other} is not supported"),
            );
        }
    };

    Reply::ok(json!({ "rows": [ { "key": null, "value": value } ] }))
}
