//! 查看器标注（markup）到模型坐标的投影。
//!
//! 每个事件都独立处理：输入只来自事件本身和查看器当前状态，调用之间不保留任何状态。

use std::collections::BTreeMap;

use psxform_core::geometry::{BoundingBox, Corners, Point2, Rectangle};
use psxform_core::projection::{project_corners, transform_corners};
use psxform_core::transform::AffineTransform;
use psxform_core::view::ViewportId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::EngineError;

/// 查看器的标注工具类型，数值与查看器内部编号一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupKind {
    Freehand,
    Label,
    Ellipse,
    Rectangle,
    Polyline,
    Arrow,
    Callout,
    Highlight,
    Polycloud,
    Cloud,
    Stamp,
}

impl MarkupKind {
    pub const ALL: [MarkupKind; 11] = [
        MarkupKind::Freehand,
        MarkupKind::Label,
        MarkupKind::Ellipse,
        MarkupKind::Rectangle,
        MarkupKind::Polyline,
        MarkupKind::Arrow,
        MarkupKind::Callout,
        MarkupKind::Highlight,
        MarkupKind::Polycloud,
        MarkupKind::Cloud,
        MarkupKind::Stamp,
    ];

    pub fn id(self) -> u8 {
        match self {
            MarkupKind::Freehand => 1,
            MarkupKind::Label => 2,
            MarkupKind::Ellipse => 4,
            MarkupKind::Rectangle => 5,
            MarkupKind::Polyline => 6,
            MarkupKind::Arrow => 7,
            MarkupKind::Callout => 8,
            MarkupKind::Highlight => 9,
            MarkupKind::Polycloud => 10,
            MarkupKind::Cloud => 11,
            MarkupKind::Stamp => 12,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    /// 查看器事件中使用的类型名。
    pub fn type_name(self) -> &'static str {
        match self {
            MarkupKind::Freehand => "freehand",
            MarkupKind::Label => "label",
            MarkupKind::Ellipse => "ellipse",
            MarkupKind::Rectangle => "rectangle",
            MarkupKind::Polyline => "polyline",
            MarkupKind::Arrow => "arrow",
            MarkupKind::Callout => "callout",
            MarkupKind::Highlight => "highlight",
            MarkupKind::Polycloud => "polycloud",
            MarkupKind::Cloud => "cloud",
            MarkupKind::Stamp => "stamp",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_name() == name)
    }

    /// 目前只有矩形支持投影。
    #[inline]
    pub fn is_projectable(self) -> bool {
        self == MarkupKind::Rectangle
    }
}

/// 查看器报告的标注：页面空间中心点与尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Markup {
    pub kind: MarkupKind,
    pub position: Point2,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportInfo {
    pub id: ViewportId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// 渲染/查看器协作方。
pub trait Viewer {
    fn page_to_model_transform(&self, viewport: ViewportId) -> Option<AffineTransform>;

    fn viewport_registry(&self) -> BTreeMap<ViewportId, ViewportInfo>;

    /// 当前获得焦点（正在渲染）的视口。
    fn focused_viewport(&self) -> Option<ViewportId> {
        None
    }
}

/// 固定数据的查看器实现。
#[derive(Debug, Clone, Default)]
pub struct StaticViewer {
    viewports: BTreeMap<ViewportId, (ViewportInfo, AffineTransform)>,
    focused: Option<ViewportId>,
}

impl StaticViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: ViewportInfo, page_to_model: AffineTransform) {
        self.viewports.insert(info.id, (info, page_to_model));
    }

    pub fn set_focused(&mut self, focused: Option<ViewportId>) {
        self.focused = focused;
    }
}

impl Viewer for StaticViewer {
    fn page_to_model_transform(&self, viewport: ViewportId) -> Option<AffineTransform> {
        self.viewports.get(&viewport).map(|(_, xform)| *xform)
    }

    fn viewport_registry(&self) -> BTreeMap<ViewportId, ViewportInfo> {
        self.viewports
            .iter()
            .map(|(id, (info, _))| (*id, info.clone()))
            .collect()
    }

    fn focused_viewport(&self) -> Option<ViewportId> {
        self.focused
    }
}

/// 选定投影所用视口：显式指定 > 查看器焦点 > 注册表中唯一的视口。
///
/// 多个视口且无法确定时返回 `AmbiguousViewport`，不做猜测。
pub fn select_viewport<V>(
    viewer: &V,
    explicit: Option<ViewportId>,
) -> Result<ViewportId, EngineError>
where
    V: Viewer + ?Sized,
{
    let registry = viewer.viewport_registry();
    let chosen = match explicit.or_else(|| viewer.focused_viewport()) {
        Some(id) => id,
        None => {
            let mut ids = registry.keys();
            match (ids.next(), ids.next()) {
                (Some(id), None) => *id,
                _ => {
                    return Err(EngineError::AmbiguousViewport {
                        count: registry.len(),
                    });
                }
            }
        }
    };
    if !registry.contains_key(&chosen) {
        return Err(EngineError::UnknownViewport(chosen.get()));
    }
    Ok(chosen)
}

/// 单次投影的结果，坐标保持完整双精度。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionReport {
    pub viewport: ViewportId,
    pub page_corners: Corners,
    pub model_corners: Corners,
    pub bounds: BoundingBox,
}

/// 把矩形标注投影为模型空间包围盒。
pub fn project_markup<V>(
    viewer: &V,
    markup: &Markup,
    viewport: Option<ViewportId>,
) -> Result<ProjectionReport, EngineError>
where
    V: Viewer + ?Sized,
{
    let rect = Rectangle::new(markup.position, markup.width, markup.height)?;
    let viewport = select_viewport(viewer, viewport)?;
    let page_to_model = viewer
        .page_to_model_transform(viewport)
        .ok_or(EngineError::MissingPageTransform(viewport.get()))?;

    let page_corners = rect.corners();
    let model_corners = transform_corners(&page_corners, &page_to_model);
    let bounds = project_corners(&page_corners, &page_to_model);
    info!(
        viewport = viewport.get(),
        min_x = bounds.min().x(),
        min_y = bounds.min().y(),
        max_x = bounds.max().x(),
        max_y = bounds.max().y(),
        "标注已投影到模型坐标"
    );
    Ok(ProjectionReport {
        viewport,
        page_corners,
        model_corners,
        bounds,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupEvent {
    /// 绘制工具切换；`None` 表示退出编辑模式。
    EditModeChanged(Option<MarkupKind>),
    MarkupSelected {
        markup: Markup,
        viewport: Option<ViewportId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupOutcome {
    Idle,
    ToolReady(MarkupKind),
    Unsupported(MarkupKind),
    Projected(ProjectionReport),
}

/// 处理一次查看器事件。
pub fn handle_event<V>(viewer: &V, event: &MarkupEvent) -> Result<MarkupOutcome, EngineError>
where
    V: Viewer + ?Sized,
{
    match event {
        MarkupEvent::EditModeChanged(None) => Ok(MarkupOutcome::Idle),
        MarkupEvent::EditModeChanged(Some(kind)) if kind.is_projectable() => {
            Ok(MarkupOutcome::ToolReady(*kind))
        }
        MarkupEvent::EditModeChanged(Some(kind)) => {
            debug!(kind = kind.type_name(), "标注工具暂不支持");
            Ok(MarkupOutcome::Unsupported(*kind))
        }
        MarkupEvent::MarkupSelected { markup, viewport } => {
            if !markup.kind.is_projectable() {
                debug!(kind = markup.kind.type_name(), "选中的标注类型暂不支持投影");
                return Ok(MarkupOutcome::Unsupported(markup.kind));
            }
            project_markup(viewer, markup, *viewport).map(MarkupOutcome::Projected)
        }
    }
}
