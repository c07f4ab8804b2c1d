//! 坐标系之间的变换解析：UCS、DCS、PSDCS 到 WCS。

use psxform_core::entity::Space;
use psxform_core::transform::AffineTransform;
use psxform_core::view::{self, Viewport};
use tracing::debug;

use crate::errors::EngineError;
use crate::session::{EditingSession, with_space};

/// 宿主报告的当前 UCS→WCS。
pub fn ucs_to_wcs<S>(session: &S) -> AffineTransform
where
    S: EditingSession + ?Sized,
{
    session.current_ucs()
}

pub fn wcs_to_ucs<S>(session: &S) -> Result<AffineTransform, EngineError>
where
    S: EditingSession + ?Sized,
{
    Ok(session.current_ucs().invert()?)
}

/// 当前视口的 DCS→WCS。
///
/// 图纸布局下需要在模型空间读取视图，读取完成后恢复原空间。
pub fn dcs_to_wcs<S>(session: &mut S) -> Result<AffineTransform, EngineError>
where
    S: EditingSession + ?Sized,
{
    let view = if session.is_paper_layout() {
        with_space(session, Space::Model, |s| Ok(s.current_view()))?
    } else {
        session.current_view()
    };
    debug!(
        target_x = view.target.x(),
        target_y = view.target.y(),
        target_z = view.target.z(),
        twist = view.twist,
        "解析 DCS→WCS"
    );
    Ok(view::dcs_to_wcs(&view)?)
}

/// 解析当前编辑上下文对应的浮动视口。
///
/// 当前视口若是图纸总览视口，则临时进入模型空间重新读取一次；
/// 该次切换失败或仍读到总览视口时返回 `CannotResolveActiveViewport`，不重试。
pub fn resolve_viewport<S>(session: &mut S) -> Result<Viewport, EngineError>
where
    S: EditingSession + ?Sized,
{
    let viewport = session.current_viewport();
    if !viewport.is_overview() {
        return Ok(viewport);
    }

    debug!(viewport = viewport.id.get(), "当前为总览视口，尝试从模型空间重新读取");
    let recovered = with_space(session, Space::Model, |s| Ok(s.current_viewport())).map_err(
        |err| EngineError::CannotResolveActiveViewport {
            reason: "switching to model space failed".to_string(),
            source: Some(Box::new(err)),
        },
    )?;
    if recovered.is_overview() {
        return Err(EngineError::CannotResolveActiveViewport {
            reason: "model space still reports the overview viewport".to_string(),
            source: None,
        });
    }
    Ok(recovered)
}

/// 图纸空间显示坐标（PSDCS）到 WCS 的变换，要求当前处于图纸布局。
pub fn psdcs_to_wcs<S>(session: &mut S) -> Result<AffineTransform, EngineError>
where
    S: EditingSession + ?Sized,
{
    if !session.is_paper_layout() {
        return Err(EngineError::NotInPaperSpace);
    }
    let viewport = resolve_viewport(session)?;
    let psdcs_to_dcs = view::psdcs_to_dcs(&viewport.view)?;
    let dcs_to_wcs = dcs_to_wcs(session)?;
    debug!(
        viewport = viewport.id.get(),
        number = viewport.number,
        scale = viewport.view.custom_scale,
        "已解析 PSDCS→WCS"
    );
    Ok(AffineTransform::compose(&dcs_to_wcs, &psdcs_to_dcs))
}
