use std::fs;
use std::path::{Path, PathBuf};

use psxform_core::entity::{Entity, EntityId, Space};
use psxform_core::transform::AffineTransform;
use psxform_core::view::{Viewport, ViewportId};
use psxform_engine::markup::{Markup, ProjectionReport, StaticViewer, ViewportInfo};
use psxform_engine::session::{EditingSession, MemorySession};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse snapshot: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

pub trait SessionLoader {
    fn load(&self, path: &Path) -> Result<LoadedSession, IoError>;
}

pub trait ReportWriter {
    fn write(&self, report: &ProjectionReport, path: &Path) -> Result<(), IoError>;
}

/// 布局类型：模型布局没有图纸空间。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Model,
    Paper,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub space: Space,
    pub entity: Entity,
}

/// 查看器侧视口：矩阵按列主序 16 个数存储。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerViewportRecord {
    pub id: ViewportId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub page_to_model: AffineTransform,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewerRecord {
    #[serde(default)]
    pub viewports: Vec<ViewerViewportRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<ViewportId>,
}

/// 编辑会话与查看器状态的 JSON 快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub layout: Layout,
    #[serde(default = "SessionSnapshot::default_space")]
    pub space: Space,
    pub overview: Viewport,
    #[serde(default)]
    pub viewports: Vec<Viewport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_viewport: Option<ViewportId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ucs: Option<AffineTransform>,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
    #[serde(default)]
    pub viewer: ViewerRecord,
    #[serde(default)]
    pub markups: Vec<Markup>,
}

impl SessionSnapshot {
    fn default_space() -> Space {
        Space::Paper
    }

    pub fn from_json(text: &str) -> Result<Self, IoError> {
        serde_json::from_str(text).map_err(IoError::Parse)
    }

    /// 构建内存会话与查看器。
    pub fn into_session(self) -> Result<LoadedSession, IoError> {
        if !self.overview.is_overview() {
            return Err(IoError::InvalidSnapshot(format!(
                "overview viewport must use the reserved number, got {}",
                self.overview.number
            )));
        }
        if let Some(vp) = self.viewports.iter().find(|vp| vp.is_overview()) {
            return Err(IoError::InvalidSnapshot(format!(
                "floating viewport {} uses the reserved overview number",
                vp.id.get()
            )));
        }

        let mut session = match self.layout {
            Layout::Paper => MemorySession::paper_layout(self.overview),
            Layout::Model => MemorySession::model_layout(self.overview.view),
        };
        for viewport in self.viewports {
            session.add_viewport(viewport);
        }
        if let Some(id) = self.active_viewport {
            session
                .activate_viewport(id)
                .map_err(|err| IoError::InvalidSnapshot(err.to_string()))?;
        }
        if let Some(ucs) = self.ucs {
            session.set_ucs(ucs);
        }
        let entities: Vec<EntityId> = self
            .entities
            .into_iter()
            .map(|record| session.database_mut().add_entity(record.space, record.entity))
            .collect();
        if self.layout == Layout::Paper && self.space == Space::Model {
            session
                .switch_to_model_space()
                .map_err(|err| IoError::InvalidSnapshot(err.to_string()))?;
        }

        let mut viewer = StaticViewer::new();
        for record in self.viewer.viewports {
            viewer.insert(
                ViewportInfo {
                    id: record.id,
                    name: record.name,
                },
                record.page_to_model,
            );
        }
        viewer.set_focused(self.viewer.focused);

        debug!(
            entities = entities.len(),
            markups = self.markups.len(),
            "快照已构建为会话"
        );
        Ok(LoadedSession {
            session,
            viewer,
            markups: self.markups,
            entities,
        })
    }
}

/// 由快照构建的会话、查看器与待处理标注。
#[derive(Debug)]
pub struct LoadedSession {
    pub session: MemorySession,
    pub viewer: StaticViewer,
    pub markups: Vec<Markup>,
    /// 按快照顺序分配的实体 ID。
    pub entities: Vec<EntityId>,
}

/// 序列化投影结果；serde_json 输出最短可往返表示，不损失精度。
pub fn report_to_json(report: &ProjectionReport) -> Result<String, IoError> {
    serde_json::to_string_pretty(report).map_err(IoError::Serialize)
}

pub fn report_from_json(text: &str) -> Result<ProjectionReport, IoError> {
    serde_json::from_str(text).map_err(IoError::Parse)
}

pub struct JsonFacade;

impl JsonFacade {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<LoadedSession, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let loaded = SessionSnapshot::from_json(&data)?.into_session()?;
        info!(path = %path.display(), "已加载会话快照");
        Ok(loaded)
    }
}

impl ReportWriter for JsonFacade {
    fn write(&self, report: &ProjectionReport, path: &Path) -> Result<(), IoError> {
        let text = report_to_json(report)?;
        fs::write(path, text).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "layout": "paper",
        "overview": {
            "id": 1,
            "number": 1,
            "view": {
                "target": [0.0, 0.0, 0.0],
                "view_direction": [0.0, 0.0, 1.0],
                "twist": 0.0,
                "custom_scale": 1.0,
                "center_point": [0.0, 0.0],
                "view_center": [0.0, 0.0]
            }
        }
    }"#;

    #[test]
    fn minimal_snapshot_uses_defaults() {
        let snapshot = SessionSnapshot::from_json(MINIMAL).unwrap();
        assert_eq!(snapshot.space, Space::Paper);
        assert!(snapshot.viewports.is_empty());
        assert!(snapshot.viewer.viewports.is_empty());

        let loaded = snapshot.into_session().unwrap();
        assert!(loaded.session.is_paper_layout());
        assert!(loaded.entities.is_empty());
    }

    #[test]
    fn overview_must_use_reserved_number() {
        let mut snapshot = SessionSnapshot::from_json(MINIMAL).unwrap();
        snapshot.overview.number = 3;
        assert!(matches!(
            snapshot.into_session(),
            Err(IoError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            SessionSnapshot::from_json("{\"layout\": "),
            Err(IoError::Parse(_))
        ));
    }
}
