//! Composable aggregate-pipeline builder: match/group/project/sort/unwind/
//! limit/skip/facet stages assembled in caller order, Mongo-shaped.
//!
//! Grounded on the original `PipelineBuilder`: each method appends one stage
//! and returns `self` so call sites read as a straight-line pipeline
//! description.

use bson::{doc, Bson, Document};

#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<Document>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        PipelineBuilder::default()
    }

    pub fn build(self) -> Vec<Document> {
        self.stages
    }

    pub fn match_stage(mut self, predicate: Document) -> Self {
        self.stages.push(doc! { "$match": predicate });
        self
    }

    pub fn match_time_range(self, start: f64, end: f64) -> Self {
        self.match_stage(doc! { "timestamp": { "$gte": start, "$lte": end } })
    }

    pub fn match_protocol(self, protocol: &str) -> Self {
        self.match_stage(doc! { "protocol": protocol })
    }

    pub fn match_source_ip(self, ip: &str) -> Self {
        self.match_stage(doc! { "source_ip": ip })
    }

    pub fn match_port(self, port: i32) -> Self {
        self.match_stage(doc! { "dest_port": port })
    }

    pub fn match_region(self, region: &str) -> Self {
        self.match_stage(doc! { "source_region": region })
    }

    pub fn group(mut self, id: Bson, fields: Document) -> Self {
        let mut group_doc = doc! { "_id": id };
        group_doc.extend(fields);
        self.stages.push(doc! { "$group": group_doc });
        self
    }

    pub fn group_by_source_ip(self) -> Self {
        self.group(
            Bson::String("$source_ip".to_string()),
            doc! {
                "total_packets": { "$sum": 1 },
                "total_bytes": { "$sum": "$length" },
                "source_region": { "$first": "$source_region" },
            },
        )
        .project(doc! {
            "source_ip": "$_id",
            "total_packets": 1,
            "total_bytes": 1,
            "source_region": 1,
            "_id": 0,
        })
    }

    pub fn group_by_protocol(self) -> Self {
        self.group(
            Bson::String("$protocol".to_string()),
            doc! {
                "total_packets": { "$sum": 1 },
                "total_bytes": { "$sum": "$length" },
            },
        )
        .project(doc! {
            "protocol": "$_id",
            "total_packets": 1,
            "total_bytes": 1,
            "_id": 0,
        })
    }

    pub fn group_by_time_interval(self, interval: f64) -> Self {
        self.group(
            Bson::Document(doc! {
                "$subtract": ["$timestamp", { "$mod": ["$timestamp", interval] }]
            }),
            doc! {
                "total_packets": { "$sum": 1 },
                "total_bytes": { "$sum": "$length" },
            },
        )
        .project(doc! {
            "start_time": "$_id",
            "end_time": { "$add": ["$_id", interval] },
            "total_packets": 1,
            "total_bytes": 1,
            "_id": 0,
        })
    }

    pub fn project(mut self, shape: Document) -> Self {
        self.stages.push(doc! { "$project": shape });
        self
    }

    pub fn sort(mut self, keys: Document) -> Self {
        self.stages.push(doc! { "$sort": keys });
        self
    }

    pub fn unwind(mut self, field: &str) -> Self {
        self.stages.push(doc! { "$unwind": format!("${field}") });
        self
    }

    pub fn limit(mut self, n: i64) -> Self {
        self.stages.push(doc! { "$limit": n });
        self
    }

    pub fn skip(mut self, n: i64) -> Self {
        self.stages.push(doc! { "$skip": n });
        self
    }

    /// Appends a pagination facet: `{metadata: [{$count: total}], data: [skip, limit]}`.
    pub fn paginate(mut self, page: i64, page_size: i64) -> Self {
        let page = page.max(1);
        let page_size = page_size.clamp(1, crate::config::MAX_PAGE_SIZE);
        let skip = (page - 1) * page_size;
        self.stages.push(doc! {
            "$facet": {
                "metadata": [ { "$count": "total" } ],
                "data": [ { "$skip": skip }, { "$limit": page_size } ],
            }
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_time_range_builds_expected_stage() {
        let pipeline = PipelineBuilder::new().match_time_range(0.0, 100.0).build();
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline[0].contains_key("$match"));
    }

    #[test]
    fn test_paginate_appends_facet_with_skip_and_limit() {
        let pipeline = PipelineBuilder::new().match_protocol("HTTP").paginate(2, 10).build();
        let facet = pipeline.last().unwrap().get_document("$facet").unwrap();
        let data_stages = facet.get_array("data").unwrap();
        assert_eq!(data_stages.len(), 2);
    }

    #[test]
    fn test_paginate_clamps_page_size_to_max() {
        let pipeline = PipelineBuilder::new().paginate(1, 10_000).build();
        let facet = pipeline.last().unwrap().get_document("$facet").unwrap();
        let data_stages = facet.get_array("data").unwrap();
        let limit_stage = data_stages[1].as_document().unwrap();
        assert_eq!(limit_stage.get_i64("$limit").unwrap(), crate::config::MAX_PAGE_SIZE);
    }

    #[test]
    fn test_group_by_protocol_produces_group_then_project() {
        let pipeline = PipelineBuilder::new().group_by_protocol().build();
        assert_eq!(pipeline.len(), 2);
        assert!(pipeline[0].contains_key("$group"));
        assert!(pipeline[1].contains_key("$project"));
    }

    #[test]
    fn test_stage_order_preserved() {
        let pipeline = PipelineBuilder::new()
            .match_protocol("HTTP")
            .sort(doc! { "timestamp": -1 })
            .limit(5)
            .build();
        assert!(pipeline[0].contains_key("$match"));
        assert!(pipeline[1].contains_key("$sort"));
        assert!(pipeline[2].contains_key("$limit"));
    }
}
