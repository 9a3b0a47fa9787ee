// Dataset record
//
// A named collection of labeled drawing file references. Training only reads
// datasets; mutation belongs to dataset-management operations.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    Ready,
    Processing,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Ordered file references; duplicates are removed on merge
    pub file_ids: Vec<String>,
    /// file_id -> class index
    pub labels: HashMap<String, usize>,
    pub file_count: usize,
    /// Derived class -> count mapping, keyed by the class index rendered as a
    /// string (the shape the record is stored and served in)
    pub label_distribution: BTreeMap<String, usize>,
    pub tags: Vec<String>,
    pub status: DatasetStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        file_ids: Vec<String>,
        labels: HashMap<String, usize>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut dataset = Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            file_count: file_ids.len(),
            file_ids,
            labels,
            label_distribution: BTreeMap::new(),
            tags: Vec::new(),
            status: DatasetStatus::Ready,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        };
        dataset.label_distribution = dataset.compute_label_distribution();
        dataset
    }

    /// Distribution over files that actually carry a label.
    pub fn compute_label_distribution(&self) -> BTreeMap<String, usize> {
        let mut distribution = BTreeMap::new();
        for file_id in &self.file_ids {
            if let Some(label) = self.labels.get(file_id) {
                *distribution.entry(label.to_string()).or_insert(0) += 1;
            }
        }
        distribution
    }

    /// Append files, skipping ids already present, and refresh derived fields.
    pub fn add_files(&mut self, file_ids: Vec<String>, labels: HashMap<String, usize>) {
        for file_id in file_ids {
            if !self.file_ids.contains(&file_id) {
                self.file_ids.push(file_id);
            }
        }
        self.labels.extend(labels);
        self.refresh();
    }

    pub fn remove_files(&mut self, file_ids: &[String]) {
        self.file_ids.retain(|id| !file_ids.contains(id));
        for file_id in file_ids {
            self.labels.remove(file_id);
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        self.file_count = self.file_ids.len();
        self.label_distribution = self.compute_label_distribution();
        self.updated_at = Utc::now();
    }
}
