//! In-memory fake `DocumentStore`, used by tests so the queue, classifier,
//! consumer, and query-engine suites never require a live MongoDB instance —
//! the same test-fixture convention the teacher used for its SQLite CRUD
//! modules (`open_memory_db()`), just fronting a `Vec<Document>` instead.
//!
//! Interprets the small subset of the aggregate vocabulary this crate's
//! `PipelineBuilder` actually emits: `$match` (equality and `$gte`/`$lte`/
//! `$lt`), `$group` (`$sum`, `$first`, plus `$subtract`/`$mod` bucket-id
//! expressions), `$project`, `$sort`, `$skip`, `$limit`, `$unwind`, `$facet`.

use super::DocumentStore;
use crate::classify::record::ClassifiedRecord;
use crate::error::AppError;
use async_trait::async_trait;
use bson::{Bson, Document};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<Vec<Document>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_one(&self, record: ClassifiedRecord) -> Result<(), AppError> {
        let doc = bson::to_document(&record).map_err(|e| AppError::Store(e.to_string()))?;
        self.docs.lock().unwrap().push(doc);
        Ok(())
    }

    async fn insert_many(&self, records: Vec<ClassifiedRecord>) -> Result<u64, AppError> {
        let mut count = 0;
        for record in records {
            self.insert_one(record).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, AppError> {
        let docs = self.docs.lock().unwrap().clone();
        Ok(run_pipeline(docs, &pipeline))
    }

    async fn delete_before(&self, timestamp: f64) -> Result<u64, AppError> {
        let mut docs = self.docs.lock().unwrap();
        let before = docs.len();
        docs.retain(|d| field_f64(d, "timestamp").map(|t| t >= timestamp).unwrap_or(true));
        Ok((before - docs.len()) as u64)
    }
}

fn field_f64(doc: &Document, key: &str) -> Option<f64> {
    doc.get(key).and_then(|b| match b {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    })
}

fn run_pipeline(mut docs: Vec<Document>, stages: &[Document]) -> Vec<Document> {
    for stage in stages {
        if let Some(predicate) = stage.get_document("$match").ok() {
            docs.retain(|d| matches_predicate(d, predicate));
        } else if let Some(group_spec) = stage.get_document("$group").ok() {
            docs = run_group(&docs, group_spec);
        } else if let Some(shape) = stage.get_document("$project").ok() {
            docs = docs.iter().map(|d| run_project(d, shape)).collect();
        } else if let Some(keys) = stage.get_document("$sort").ok() {
            run_sort(&mut docs, keys);
        } else if let Some(n) = stage.get_i64("$skip").ok() {
            docs = docs.into_iter().skip(n.max(0) as usize).collect();
        } else if let Some(n) = stage.get_i64("$limit").ok() {
            docs.truncate(n.max(0) as usize);
        } else if let Some(field) = stage.get_str("$unwind").ok() {
            docs = run_unwind(&docs, field.trim_start_matches('$'));
        } else if let Some(facet_spec) = stage.get_document("$facet").ok() {
            return run_facet(&docs, facet_spec);
        }
    }
    docs
}

fn matches_predicate(doc: &Document, predicate: &Document) -> bool {
    predicate.iter().all(|(key, expected)| match expected {
        Bson::Document(ops) => ops.iter().all(|(op, val)| {
            let Some(actual) = field_f64(doc, key).or_else(|| doc.get(key).and_then(|b| b.as_str().map(|_| 0.0))) else {
                return false;
            };
            let val_f64 = val.as_f64().or_else(|| val.as_i32().map(|v| v as f64)).or_else(|| val.as_i64().map(|v| v as f64));
            match (op.as_str(), val_f64) {
                ("$gte", Some(v)) => actual >= v,
                ("$lte", Some(v)) => actual <= v,
                ("$lt", Some(v)) => actual < v,
                ("$gt", Some(v)) => actual > v,
                _ => true,
            }
        }),
        other => doc.get(key).map(|actual| actual == other).unwrap_or(false),
    })
}

fn run_group(docs: &[Document], spec: &Document) -> Vec<Document> {
    let id_expr = spec.get("_id").cloned().unwrap_or(Bson::Null);
    let mut buckets: HashMap<String, (Bson, Vec<&Document>)> = HashMap::new();

    for doc in docs {
        let id_val = eval_group_id(doc, &id_expr);
        let key = id_val.to_string();
        buckets.entry(key).or_insert_with(|| (id_val.clone(), Vec::new())).1.push(doc);
    }

    buckets
        .into_values()
        .map(|(id_val, members)| {
            let mut out = Document::new();
            out.insert("_id", id_val);
            for (field, accumulator) in spec.iter() {
                if field == "_id" {
                    continue;
                }
                out.insert(field, eval_accumulator(&members, accumulator));
            }
            out
        })
        .collect()
}

fn eval_group_id(doc: &Document, expr: &Bson) -> Bson {
    match expr {
        Bson::String(path) if path.starts_with('$') => {
            doc.get(&path[1..]).cloned().unwrap_or(Bson::Null)
        }
        Bson::Document(inner) => {
            if let Some(args) = inner.get_array("$subtract").ok() {
                let a = eval_group_id(doc, &args[0]).as_f64().unwrap_or(0.0);
                let b = eval_group_id(doc, &args[1]).as_f64().unwrap_or(0.0);
                Bson::Double(a - b)
            } else if let Some(args) = inner.get_array("$mod").ok() {
                let a = eval_group_id(doc, &args[0]).as_f64().unwrap_or(0.0);
                let b = eval_group_id(doc, &args[1]).as_f64().unwrap_or(1.0);
                Bson::Double(a % b)
            } else {
                Bson::Null
            }
        }
        other => other.clone(),
    }
}

fn eval_accumulator(members: &[&Document], accumulator: &Bson) -> Bson {
    let Bson::Document(acc) = accumulator else { return Bson::Null };
    if let Some(expr) = acc.get("$sum") {
        let sum: f64 = members
            .iter()
            .map(|d| match expr {
                Bson::Int32(n) => *n as f64,
                Bson::String(path) if path.starts_with('$') => field_f64(d, &path[1..]).unwrap_or(0.0),
                _ => 0.0,
            })
            .sum();
        return if sum.fract() == 0.0 { Bson::Int64(sum as i64) } else { Bson::Double(sum) };
    }
    if let Some(Bson::String(path)) = acc.get("$first") {
        if let Some(first) = members.first() {
            return first.get(path.trim_start_matches('$')).cloned().unwrap_or(Bson::Null);
        }
    }
    Bson::Null
}

fn run_project(doc: &Document, shape: &Document) -> Document {
    let mut out = Document::new();
    for (field, spec) in shape.iter() {
        match spec {
            Bson::Int32(1) | Bson::Boolean(true) => {
                if let Some(v) = doc.get(field) {
                    out.insert(field.clone(), v.clone());
                }
            }
            Bson::Int32(0) | Bson::Boolean(false) => {}
            Bson::String(path) if path.starts_with('$') => {
                if let Some(v) = doc.get(&path[1..]) {
                    out.insert(field.clone(), v.clone());
                }
            }
            Bson::Document(inner) => {
                if let Some(args) = inner.get_array("$add").ok() {
                    let a = eval_group_id(doc, &args[0]).as_f64().unwrap_or(0.0);
                    let b = eval_group_id(doc, &args[1]).as_f64().unwrap_or(0.0);
                    out.insert(field.clone(), Bson::Double(a + b));
                }
            }
            _ => {}
        }
    }
    out
}

fn run_sort(docs: &mut [Document], keys: &Document) {
    docs.sort_by(|a, b| {
        for (field, dir) in keys.iter() {
            let dir = dir.as_i32().unwrap_or(1);
            let av = field_f64(a, field).unwrap_or(0.0);
            let bv = field_f64(b, field).unwrap_or(0.0);
            let ord = av.partial_cmp(&bv).unwrap_or(CmpOrdering::Equal);
            let ord = if dir < 0 { ord.reverse() } else { ord };
            if ord != CmpOrdering::Equal {
                return ord;
            }
        }
        CmpOrdering::Equal
    });
}

fn run_unwind(docs: &[Document], field: &str) -> Vec<Document> {
    let mut out = Vec::new();
    for doc in docs {
        if let Some(Bson::Array(items)) = doc.get(field) {
            for item in items {
                let mut clone = doc.clone();
                clone.insert(field, item.clone());
                out.push(clone);
            }
        } else {
            out.push(doc.clone());
        }
    }
    out
}

fn run_facet(docs: &[Document], facet_spec: &Document) -> Vec<Document> {
    let mut out = Document::new();
    for (name, sub_pipeline) in facet_spec.iter() {
        let Bson::Array(stages) = sub_pipeline else { continue };
        let stages: Vec<Document> = stages.iter().filter_map(|s| s.as_document().cloned()).collect();
        let result = run_pipeline(docs.to_vec(), &stages);
        out.insert(name.clone(), Bson::Array(result.into_iter().map(Bson::Document).collect()));
    }
    vec![out]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::record::Layer;

    fn make_record(protocol: &str, timestamp: f64, source_ip: &str, length: u32) -> ClassifiedRecord {
        ClassifiedRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            layer: Layer::Application,
            source_ip: source_ip.to_string(),
            source_port: 1234,
            dest_port: 80,
            source_region: "US".to_string(),
            protocol: protocol.to_string(),
            length,
            is_handshake: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_match_time_range() {
        let store = InMemoryStore::new();
        store.insert_one(make_record("HTTP", 10.0, "1.1.1.1", 100)).await.unwrap();
        store.insert_one(make_record("HTTP", 200.0, "1.1.1.1", 100)).await.unwrap();

        let pipeline = super::super::pipeline::PipelineBuilder::new().match_time_range(0.0, 50.0).build();
        let results = store.aggregate(pipeline).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_group_by_protocol_sums_bytes() {
        let store = InMemoryStore::new();
        store.insert_one(make_record("HTTP", 1.0, "1.1.1.1", 100)).await.unwrap();
        store.insert_one(make_record("HTTP", 2.0, "1.1.1.1", 50)).await.unwrap();
        store.insert_one(make_record("DNS", 3.0, "2.2.2.2", 30)).await.unwrap();

        let pipeline = super::super::pipeline::PipelineBuilder::new().group_by_protocol().build();
        let results = store.aggregate(pipeline).await.unwrap();
        assert_eq!(results.len(), 2);
        let http = results.iter().find(|d| d.get_str("protocol").unwrap() == "HTTP").unwrap();
        assert_eq!(http.get_i64("total_bytes").unwrap(), 150);
    }

    #[tokio::test]
    async fn test_pagination_facet_reports_total_and_page() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.insert_one(make_record("HTTP", i as f64, "1.1.1.1", 10)).await.unwrap();
        }
        let pipeline = super::super::pipeline::PipelineBuilder::new().paginate(1, 2).build();
        let results = store.aggregate(pipeline).await.unwrap();
        let facet_doc = &results[0];
        let total = facet_doc.get_array("metadata").unwrap()[0].as_document().unwrap().get_i32("total").unwrap();
        let data = facet_doc.get_array("data").unwrap();
        assert_eq!(total, 5);
        assert_eq!(data.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_before_removes_old_records() {
        let store = InMemoryStore::new();
        store.insert_one(make_record("HTTP", 1.0, "1.1.1.1", 10)).await.unwrap();
        store.insert_one(make_record("HTTP", 100.0, "1.1.1.1", 10)).await.unwrap();
        let deleted = store.delete_before(50.0).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.len(), 1);
    }
}
