//! Export of approved work as a self-describing zip bundle.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::info;

use crate::engine::Engine;
use crate::io::archive::Bundle;
use crate::io::artifacts::timestamp;
use crate::io::documents::markdown_files;
use crate::io::generator::Generator;
use crate::io::prompt::{ExportReadme, ReadmeArtifact};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestArtifact {
    pub file: String,
    pub task_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestFile {
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestTask {
    #[serde(skip)]
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub loop_iterations: u32,
}

/// Completed tasks keyed by id, serialized in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedTasks(pub Vec<ManifestTask>);

impl Serialize for CompletedTasks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for task in &self.0 {
            map.serialize_entry(&task.id, task)?;
        }
        map.end()
    }
}

/// `manifest.json` at the root of an export bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportManifest {
    pub export_timestamp: String,
    pub engine_version: String,
    pub artifacts: Vec<ManifestArtifact>,
    pub contracts: Vec<ManifestFile>,
    pub qa_reports: Vec<ManifestFile>,
    pub redteam_reports: Vec<ManifestFile>,
    pub tasks: CompletedTasks,
}

/// Where the bundle went and what it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub manifest: ExportManifest,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_names(files: &[ManifestFile]) -> Vec<String> {
    files.iter().map(|file| file.file.clone()).collect()
}

impl<G: Generator> Engine<G> {
    /// Bundle `done/` as `artifacts/`, `contracts/`, and optionally the QA and
    /// red-team reports into `exports/{output_name}` (default
    /// `export-YYYYMMDD-HHMMSS.zip`).
    pub fn export_done(&self, output_name: Option<&str>, include_reports: bool) -> Result<ExportSummary> {
        let now = Utc::now();
        let stamp = now.format("%Y%m%d-%H%M%S").to_string();
        let name = match output_name {
            Some(name) => {
                if name.contains(['/', '\\']) {
                    return Err(anyhow!("export name must be a file name, got '{name}'"));
                }
                name.to_string()
            }
            None => format!("export-{stamp}.zip"),
        };
        let path = self.paths.exports_dir.join(&name);

        let done = markdown_files(&self.paths.done_dir)?;
        let contracts = markdown_files(&self.paths.contracts_dir)?;
        let (qa, redteam) = if include_reports {
            (
                markdown_files(&self.paths.qa_dir)?,
                markdown_files(&self.paths.redteam_dir)?,
            )
        } else {
            (Vec::new(), Vec::new())
        };

        let tasks = self
            .state
            .completed_tasks
            .iter()
            .filter_map(|id| self.state.task(id))
            .map(|task| ManifestTask {
                id: task.id.clone(),
                title: task.title.clone(),
                task_type: task.task_type.as_str().to_string(),
                loop_iterations: if task.loop_config.enabled {
                    task.loop_state.iteration
                } else {
                    0
                },
            })
            .collect();

        let manifest = ExportManifest {
            export_timestamp: stamp,
            engine_version: self.config.engine_version.clone(),
            artifacts: done
                .iter()
                .map(|p| ManifestArtifact {
                    file: file_name(p),
                    task_id: file_stem(p),
                })
                .collect(),
            contracts: contracts.iter().map(|p| ManifestFile { file: file_name(p) }).collect(),
            qa_reports: qa.iter().map(|p| ManifestFile { file: file_name(p) }).collect(),
            redteam_reports: redteam.iter().map(|p| ManifestFile { file: file_name(p) }).collect(),
            tasks: CompletedTasks(tasks),
        };

        let mut bundle = Bundle::create(&path)?;
        let mut manifest_json =
            serde_json::to_string_pretty(&manifest).context("serialize export manifest")?;
        manifest_json.push('\n');
        bundle.add_bytes("manifest.json", manifest_json.as_bytes())?;
        let groups = [
            ("artifacts", &done),
            ("contracts", &contracts),
            ("reports/qa", &qa),
            ("reports/redteam", &redteam),
        ];
        for (folder, files) in groups {
            for file in files {
                bundle.add_file(&format!("{folder}/{}", file_name(file)), file)?;
            }
        }
        let readme = self.export_readme(&manifest, &timestamp(now))?;
        bundle.add_bytes("README.md", readme.as_bytes())?;
        let entries = bundle.entries();
        bundle.finish()?;

        info!(path = %path.display(), entries, "export written");
        Ok(ExportSummary { path, manifest })
    }

    fn export_readme(&self, manifest: &ExportManifest, exported: &str) -> Result<String> {
        let artifacts = manifest
            .artifacts
            .iter()
            .map(|artifact| ReadmeArtifact {
                file: artifact.file.clone(),
                title: self
                    .state
                    .task(&artifact.task_id)
                    .map(|task| task.title.clone())
                    .unwrap_or_else(|| artifact.task_id.clone()),
            })
            .collect();
        self.prompts.export_readme(&ExportReadme {
            exported: exported.to_string(),
            engine_version: manifest.engine_version.clone(),
            artifacts,
            contracts: file_names(&manifest.contracts),
            qa_reports: file_names(&manifest.qa_reports),
            redteam_reports: file_names(&manifest.redteam_reports),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::AgentType;
    use crate::engine::RunOptions;
    use crate::test_support::TestWorkspace;
    use std::fs::File;
    use std::io::Read;

    fn read_entry(path: &Path, name: &str) -> String {
        let mut archive = zip::ZipArchive::new(File::open(path).expect("open")).expect("archive");
        let mut body = String::new();
        archive
            .by_name(name)
            .expect("entry")
            .read_to_string(&mut body)
            .expect("read");
        body
    }

    fn approved_workspace() -> TestWorkspace {
        TestWorkspace::new()
            .task("01-spec.yaml", "id: spec\ntitle: Spec\nagent_type: contract\nprompt: define\nrequires_review: false\n")
            .task("02-impl.yaml", "id: impl\ntitle: Impl\nagent_type: developer\nprompt: build\ndepends_on: [spec]\nrequires_review: false\nrequires_qa: true\n")
            .agent(AgentType::Contract)
            .agent(AgentType::Developer)
            .agent(AgentType::Qa)
    }

    #[test]
    fn bundles_approved_work_in_completion_order() {
        let ws = approved_workspace();
        let mut engine = ws.engine();
        engine.generator().push(AgentType::Contract, "contract");
        engine.run_task("spec", RunOptions::default()).expect("run spec");
        engine.approve("spec").expect("approve spec");
        engine.generator().push(AgentType::Developer, "implementation");
        engine.generator().push(AgentType::Qa, "PASS");
        engine.run_task("impl", RunOptions::default()).expect("run impl");
        engine.approve("impl").expect("approve impl");

        let summary = engine.export_done(Some("bundle.zip"), true).expect("export");
        assert_eq!(summary.path, engine.paths().exports_dir.join("bundle.zip"));
        assert_eq!(summary.manifest.artifacts.len(), 1);
        assert_eq!(summary.manifest.artifacts[0].task_id, "impl");
        assert_eq!(summary.manifest.contracts[0].file, "spec.md");
        assert_eq!(summary.manifest.qa_reports[0].file, "impl-qa.md");

        let manifest: serde_json::Value =
            serde_json::from_str(&read_entry(&summary.path, "manifest.json")).expect("manifest");
        let ids: Vec<&String> = manifest["tasks"].as_object().expect("tasks").keys().collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(manifest["tasks"]["impl"]["type"], "implementation");
        assert_eq!(manifest["tasks"]["spec"]["loop_iterations"], 0);
        assert_eq!(manifest["engine_version"], "1.0.0");

        assert!(read_entry(&summary.path, "artifacts/impl.md").contains("implementation"));
        assert!(read_entry(&summary.path, "contracts/spec.md").contains("contract"));
        assert!(read_entry(&summary.path, "reports/qa/impl-qa.md").contains("PASS"));
        let readme = read_entry(&summary.path, "README.md");
        assert!(readme.contains("- `artifacts/impl.md` - Impl"));
        assert!(readme.contains("### QA Reports"));
    }

    #[test]
    fn manifest_tasks_follow_completion_order() {
        let manifest = CompletedTasks(vec![
            ManifestTask {
                id: "zeta".to_string(),
                title: "Z".to_string(),
                task_type: "contract".to_string(),
                loop_iterations: 0,
            },
            ManifestTask {
                id: "alpha".to_string(),
                title: "A".to_string(),
                task_type: "implementation".to_string(),
                loop_iterations: 2,
            },
        ]);
        let json = serde_json::to_string(&manifest).expect("serialize");
        assert_eq!(
            json,
            "{\"zeta\":{\"title\":\"Z\",\"type\":\"contract\",\"loop_iterations\":0},\"alpha\":{\"title\":\"A\",\"type\":\"implementation\",\"loop_iterations\":2}}"
        );
    }

    #[test]
    fn reports_can_be_left_out() {
        let ws = approved_workspace().file("qa/impl-qa.md", "# QA Report").file("done/impl.md", "done");
        let engine = ws.engine();
        let summary = engine.export_done(None, false).expect("export");
        let name = file_name(&summary.path);
        assert!(name.starts_with("export-") && name.ends_with(".zip"));
        assert!(summary.manifest.qa_reports.is_empty());
        let readme = read_entry(&summary.path, "README.md");
        assert!(!readme.contains("QA Reports"));
    }

    #[test]
    fn rejects_paths_as_export_names() {
        let ws = approved_workspace();
        let err = ws.engine().export_done(Some("../x.zip"), true).unwrap_err();
        assert!(err.to_string().contains("file name"));
    }
}
