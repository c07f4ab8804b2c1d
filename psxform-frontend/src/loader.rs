use std::env;
use std::path::PathBuf;

use psxform_config::AppConfig;
use psxform_core::entity::{Entity, Space};
use psxform_core::geometry::{Point2, Point3};
use psxform_core::view::{self, OVERVIEW_VIEWPORT_NUMBER, ViewDescriptor, Viewport, ViewportId};
use psxform_engine::markup::{Markup, MarkupKind, StaticViewer, ViewportInfo};
use psxform_engine::session::{EditingSession, MemorySession};
use psxform_io::{JsonFacade, LoadedSession, SessionLoader};
use tracing::{info, warn};

/// 会话来源，便于前端呈现加载信息。
#[derive(Debug, Clone)]
pub enum SessionSource {
    Snapshot(PathBuf),
    Demo,
}

#[derive(Debug)]
pub struct LoadedDemo {
    pub loaded: LoadedSession,
    pub source: SessionSource,
}

/// 按环境变量 `PSXFORM_SESSION`、配置中的快照路径依次尝试加载，
/// 全部失败时回退到内置示例。
pub fn load_session(config: &AppConfig) -> LoadedDemo {
    let candidate = env::var_os("PSXFORM_SESSION")
        .map(PathBuf::from)
        .or_else(|| config.session.snapshot.clone());
    if let Some(path) = candidate {
        match JsonFacade::new().load(&path) {
            Ok(loaded) => {
                info!(path = %path.display(), "从快照加载会话成功");
                return LoadedDemo {
                    loaded,
                    source: SessionSource::Snapshot(path),
                };
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载快照失败，回退到内置示例");
            }
        }
    }

    LoadedDemo {
        loaded: demo_session(),
        source: SessionSource::Demo,
    }
}

/// 内置示例：A4 图纸上一个 1:50 的浮动视口，图纸空间里画了一个矩形批注和一段文字。
pub fn demo_session() -> LoadedSession {
    let overview = Viewport {
        id: ViewportId::new(1),
        number: OVERVIEW_VIEWPORT_NUMBER,
        view: ViewDescriptor {
            center_point: Point2::new(148.5, 105.0),
            view_center: Point2::new(148.5, 105.0),
            ..ViewDescriptor::plan(Point3::ORIGIN)
        },
    };
    let floating = Viewport {
        id: ViewportId::new(2),
        number: 2,
        view: ViewDescriptor {
            custom_scale: 0.02,
            center_point: Point2::new(150.0, 100.0),
            ..ViewDescriptor::plan(Point3::new(2500.0, 1200.0, 0.0))
        },
    };

    let mut session = MemorySession::paper_layout(overview);
    session.add_viewport(floating);
    let entities = vec![
        session.database_mut().add_entity(
            Space::Paper,
            Entity::polyline(
                [
                    Point3::new(140.0, 95.0, 0.0),
                    Point3::new(160.0, 95.0, 0.0),
                    Point3::new(160.0, 105.0, 0.0),
                    Point3::new(140.0, 105.0, 0.0),
                ],
                true,
                "MARKUP",
            ),
        ),
        session.database_mut().add_entity(
            Space::Paper,
            Entity::text(Point3::new(140.0, 107.0, 0.0), "检查此处", 2.5, 0.0, "MARKUP"),
        ),
    ];

    let mut viewer = StaticViewer::new();
    match view::psdcs_to_wcs(&floating.view) {
        Ok(page_to_model) => viewer.insert(
            ViewportInfo {
                id: floating.id,
                name: Some("平面图".to_string()),
            },
            page_to_model,
        ),
        Err(err) => warn!(error = %err, "示例视口无法求得页面到模型变换"),
    }

    let markups = vec![
        Markup {
            kind: MarkupKind::Rectangle,
            position: Point2::new(150.0, 100.0),
            width: 20.0,
            height: 10.0,
        },
        Markup {
            kind: MarkupKind::Arrow,
            position: Point2::new(120.0, 80.0),
            width: 5.0,
            height: 5.0,
        },
    ];

    LoadedSession {
        session,
        viewer,
        markups,
        entities,
    }
}
