//! Hand-off of the ranked node list to the configuration writer.
//!
//! The emitter always invokes the writer, passing an empty list explicitly
//! when nothing survived validation: downstream publication pipelines must
//! never fail for lack of input, so every artifact is created in a
//! well-formed empty shape.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::info;

use crate::codec;
use crate::node::Node;
use crate::probe::{SubStat, ValidationReport};

/// Node cap for the compact configuration variant.
const MINI_CAP: usize = 20;

pub trait ArtifactWriter {
    fn write_artifacts(&self, nodes: &[Node], report: &ValidationReport) -> anyhow::Result<()>;
}

/// Invoke the writer with the ranked list, or with the explicit empty
/// signal when the list is empty.
pub fn emit(
    nodes: &[Node],
    report: &ValidationReport,
    writer: &dyn ArtifactWriter,
) -> anyhow::Result<()> {
    if nodes.is_empty() {
        info!("no valid nodes this run; writing placeholder artifacts");
    } else {
        info!("emitting {} ranked nodes", nodes.len());
    }
    writer.write_artifacts(nodes, report)
}

#[derive(Serialize)]
struct StatsDoc<'a> {
    timestamp: i64,
    total_nodes: u64,
    valid_nodes: u64,
    success_rate: f64,
    per_subscription: &'a std::collections::BTreeMap<String, SubStat>,
}

/// Writes the ranked-node configuration pair, the flat URI lists, and the
/// validation stats record into one output directory.
pub struct ClashWriter {
    output_dir: PathBuf,
}

impl ClashWriter {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    fn config_doc(nodes: &[Node]) -> Value {
        let mut doc = Mapping::new();
        doc.insert("port".into(), Value::Number(7890.into()));
        doc.insert("socks-port".into(), Value::Number(7891.into()));
        doc.insert("allow-lan".into(), Value::Bool(false));
        doc.insert("mode".into(), Value::String("rule".into()));
        doc.insert("log-level".into(), Value::String("info".into()));
        doc.insert(
            "proxies".into(),
            Value::Sequence(nodes.iter().map(codec::to_clash_mapping).collect()),
        );
        Value::Mapping(doc)
    }

    fn uri_list(nodes: &[Node]) -> String {
        nodes
            .iter()
            .map(|n| {
                let mut line = codec::format_uri(n);
                line.push('\n');
                line
            })
            .collect()
    }
}

impl ArtifactWriter for ClashWriter {
    fn write_artifacts(&self, nodes: &[Node], report: &ValidationReport) -> anyhow::Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        let mini = &nodes[..nodes.len().min(MINI_CAP)];

        fs::write(
            self.output_dir.join("clash.yml"),
            serde_yaml::to_string(&Self::config_doc(nodes))?,
        )?;
        fs::write(
            self.output_dir.join("clash_mini.yml"),
            serde_yaml::to_string(&Self::config_doc(mini))?,
        )?;
        fs::write(self.output_dir.join("nodes.txt"), Self::uri_list(nodes))?;
        fs::write(self.output_dir.join("nodes_mini.txt"), Self::uri_list(mini))?;

        let stats = StatsDoc {
            timestamp: Utc::now().timestamp(),
            total_nodes: report.total_nodes,
            valid_nodes: report.valid_nodes,
            success_rate: report.success_rate(),
            per_subscription: &report.per_subscription,
        };
        fs::write(
            self.output_dir.join("validation_stats.json"),
            serde_json::to_string_pretty(&stats)?,
        )?;
        Ok(())
    }
}
