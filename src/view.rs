//! Presentation layer.
//!
//! Pure projections of command results into text. Rendering returns a `String`
//! so nothing in here can fail at runtime; the caller decides where it goes.

use crate::config::ViewType;
use comfy_table::{ContentArrangement, Table};
use console::style;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushSummary {
    pub reference: String,
    pub files: usize,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerEntry {
    pub name: String,
    pub digest: String,
    pub media_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub artifact: String,
    pub registry: String,
    pub digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub layers: Vec<LayerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub version: String,
    pub platform: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            other => other,
        };
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}/{}", std::env::consts::OS, arch),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct View {
    view: ViewType,
}

impl View {
    pub fn new(view: ViewType) -> Self {
        Self { view }
    }

    pub fn push(&self, summary: &PushSummary) -> String {
        match self.view {
            ViewType::Json => to_json(summary),
            ViewType::Human => format!(
                "Successfully pushed {} RGD file(s) to {}\nDigest: {}\n",
                summary.files, summary.reference, summary.digest
            ),
        }
    }

    pub fn inspect(&self, report: &InspectReport) -> String {
        if self.view == ViewType::Json {
            return to_json(report);
        }

        let mut out = String::new();
        out.push_str(&format!("Artifact:  {}\n", report.artifact));
        out.push_str(&format!("Registry:  {}\n", report.registry));
        out.push_str(&format!("Digest:    {}\n", report.digest));
        if let Some(created) = &report.created {
            out.push_str(&format!("Created:   {}\n", created));
        }

        if report.layers.is_empty() {
            out.push_str("\nNo ResourceGraphDefinitions found in artifact\n");
            return out;
        }

        out.push_str(&format!("\n{}\n", style("ResourceGraphDefinitions:").bold()));
        let mut table = new_table(&["Name", "Digest"]);
        for layer in &report.layers {
            table.add_row(vec![layer.name.as_str(), layer.digest.as_str()]);
        }
        out.push_str(&table.to_string());
        out.push('\n');
        out
    }

    pub fn version(&self, info: &VersionInfo) -> String {
        match self.view {
            ViewType::Json => to_json(info),
            ViewType::Human => format!("kroctl version {}\n{}\n", info.version, info.platform),
        }
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Disabled);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

fn to_json<T: Serialize>(value: &T) -> String {
    // Report types hold only strings and integers.
    let mut json = serde_json::to_string_pretty(value).expect("report types always serialize");
    json.push('\n');
    json
}
