use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use psxform_core::entity::{EntityId, Space};
use psxform_core::transform::AffineTransform;
use psxform_core::view::{OVERVIEW_VIEWPORT_NUMBER, ViewDescriptor, Viewport, ViewportId};
use tracing::{debug, warn};

use crate::database::{Database, Transaction};
use crate::errors::EngineError;

/// 宿主编辑会话提供的能力。调用方在一次命令执行期间独占该会话。
pub trait EditingSession {
    /// 当前是否位于图纸布局（而非模型布局）。
    fn is_paper_layout(&self) -> bool;

    fn active_space(&self) -> Space;

    fn switch_to_model_space(&mut self) -> Result<(), EngineError>;

    fn switch_to_paper_space(&mut self) -> Result<(), EngineError>;

    /// 当前视口的视图快照。
    fn current_view(&self) -> ViewDescriptor;

    fn current_viewport(&self) -> Viewport;

    /// 当前 UCS→WCS 变换。
    fn current_ucs(&self) -> AffineTransform;

    /// 交互式拾取实体；用户取消时返回 `UserCancelledSelection`。
    fn pick_entity(&mut self, prompt: &str) -> Result<EntityId, EngineError>;

    fn database(&self) -> &Database;

    fn database_mut(&mut self) -> &mut Database;

    fn begin_transaction(&mut self) -> Transaction<'_> {
        Transaction::start(self.database_mut())
    }
}

fn switch_space<S>(session: &mut S, space: Space) -> Result<(), EngineError>
where
    S: EditingSession + ?Sized,
{
    match space {
        Space::Model => session.switch_to_model_space(),
        Space::Paper => session.switch_to_paper_space(),
    }
}

/// 临时切换活动空间的作用域守卫。离开作用域（含 panic 展开）时恢复原空间。
pub struct SpaceScope<'a, S: EditingSession + ?Sized> {
    session: &'a mut S,
    original: Space,
    switched: bool,
}

impl<'a, S: EditingSession + ?Sized> SpaceScope<'a, S> {
    /// 进入 `space`；若已处于该空间则不做切换。
    pub fn enter(session: &'a mut S, space: Space) -> Result<Self, EngineError> {
        let original = session.active_space();
        let switched = original != space;
        if switched {
            switch_space(&mut *session, space)?;
            debug!(?original, entered = ?space, "临时切换活动空间");
        }
        Ok(Self {
            session,
            original,
            switched,
        })
    }

    /// 显式恢复原空间并返回恢复结果。
    pub fn restore(mut self) -> Result<(), EngineError> {
        if !self.switched {
            return Ok(());
        }
        self.switched = false;
        switch_space(&mut *self.session, self.original)
    }
}

impl<S: EditingSession + ?Sized> Deref for SpaceScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: EditingSession + ?Sized> DerefMut for SpaceScope<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
    }
}

impl<S: EditingSession + ?Sized> Drop for SpaceScope<'_, S> {
    fn drop(&mut self) {
        if self.switched {
            if let Err(err) = switch_space(&mut *self.session, self.original) {
                warn!(error = %err, original = ?self.original, "恢复活动空间失败");
            }
        }
    }
}

/// 进入 `space` 执行 `f`，无论成功与否都恢复原空间。
///
/// `f` 的错误优先于恢复失败的错误返回。
pub fn with_space<S, T, F>(session: &mut S, space: Space, f: F) -> Result<T, EngineError>
where
    S: EditingSession + ?Sized,
    F: FnOnce(&mut S) -> Result<T, EngineError>,
{
    let mut scope = SpaceScope::enter(session, space)?;
    let result = f(&mut *scope);
    let restored = scope.restore();
    match (result, restored) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(restore_err)) => {
            warn!(error = %restore_err, "操作失败后恢复活动空间也失败");
            Err(err)
        }
    }
}

/// 内存实现的编辑会话，供 CLI 演示与测试使用。
#[derive(Debug, Clone)]
pub struct MemorySession {
    database: Database,
    paper_layout: bool,
    space: Space,
    overview: Viewport,
    viewports: Vec<Viewport>,
    active_viewport: Option<ViewportId>,
    ucs: AffineTransform,
    picks: VecDeque<Option<EntityId>>,
    model_switch_attempts: usize,
    model_switch_blocked: bool,
    paper_switch_blocked: bool,
}

impl MemorySession {
    /// 位于图纸布局、图纸空间活动的会话。
    pub fn paper_layout(overview: Viewport) -> Self {
        Self {
            database: Database::new(),
            paper_layout: true,
            space: Space::Paper,
            overview,
            viewports: Vec::new(),
            active_viewport: None,
            ucs: AffineTransform::IDENTITY,
            picks: VecDeque::new(),
            model_switch_attempts: 0,
            model_switch_blocked: false,
            paper_switch_blocked: false,
        }
    }

    /// 位于模型布局的会话（始终为模型空间）。
    pub fn model_layout(view: ViewDescriptor) -> Self {
        let mut session = Self::paper_layout(Viewport {
            id: ViewportId::new(0),
            number: OVERVIEW_VIEWPORT_NUMBER,
            view,
        });
        session.paper_layout = false;
        session.space = Space::Model;
        session
    }

    /// 添加浮动视口；第一个添加的视口成为默认活动视口。
    pub fn add_viewport(&mut self, viewport: Viewport) {
        if self.active_viewport.is_none() && !viewport.is_overview() {
            self.active_viewport = Some(viewport.id);
        }
        self.viewports.push(viewport);
    }

    pub fn activate_viewport(&mut self, id: ViewportId) -> Result<(), EngineError> {
        if self.viewports.iter().any(|vp| vp.id == id) {
            self.active_viewport = Some(id);
            Ok(())
        } else {
            Err(EngineError::SpaceSwitch {
                target: Space::Model,
                reason: format!("viewport {} does not exist", id.get()),
            })
        }
    }

    pub fn set_ucs(&mut self, ucs: AffineTransform) {
        self.ucs = ucs;
    }

    /// 预置一次拾取结果；`None` 表示用户取消。
    pub fn queue_pick(&mut self, pick: Option<EntityId>) {
        self.picks.push_back(pick);
    }

    /// 让后续切换到模型空间的尝试失败，模拟宿主拒绝激活视口。
    pub fn block_model_switch(&mut self, blocked: bool) {
        self.model_switch_blocked = blocked;
    }

    /// 让后续切换回图纸空间的尝试失败，模拟宿主无法恢复原空间。
    pub fn block_paper_switch(&mut self, blocked: bool) {
        self.paper_switch_blocked = blocked;
    }

    /// 累计的切换到模型空间的尝试次数（含失败）。
    #[inline]
    pub fn model_switch_attempts(&self) -> usize {
        self.model_switch_attempts
    }

    fn active_floating_viewport(&self) -> Option<&Viewport> {
        let id = self.active_viewport?;
        self.viewports.iter().find(|vp| vp.id == id)
    }
}

impl EditingSession for MemorySession {
    fn is_paper_layout(&self) -> bool {
        self.paper_layout
    }

    fn active_space(&self) -> Space {
        self.space
    }

    fn switch_to_model_space(&mut self) -> Result<(), EngineError> {
        self.model_switch_attempts += 1;
        if !self.paper_layout {
            return Ok(());
        }
        if self.model_switch_blocked {
            return Err(EngineError::SpaceSwitch {
                target: Space::Model,
                reason: "host refused to activate a viewport".to_string(),
            });
        }
        if self.active_floating_viewport().is_none() {
            return Err(EngineError::SpaceSwitch {
                target: Space::Model,
                reason: "no floating viewport is available".to_string(),
            });
        }
        self.space = Space::Model;
        Ok(())
    }

    fn switch_to_paper_space(&mut self) -> Result<(), EngineError> {
        if !self.paper_layout {
            return Err(EngineError::SpaceSwitch {
                target: Space::Paper,
                reason: "model layout has no paper space".to_string(),
            });
        }
        if self.paper_switch_blocked {
            return Err(EngineError::SpaceSwitch {
                target: Space::Paper,
                reason: "host refused to leave the viewport".to_string(),
            });
        }
        self.space = Space::Paper;
        Ok(())
    }

    fn current_view(&self) -> ViewDescriptor {
        self.current_viewport().view
    }

    fn current_viewport(&self) -> Viewport {
        match self.space {
            Space::Model => self
                .active_floating_viewport()
                .copied()
                .unwrap_or(self.overview),
            Space::Paper => self.overview,
        }
    }

    fn current_ucs(&self) -> AffineTransform {
        self.ucs
    }

    fn pick_entity(&mut self, prompt: &str) -> Result<EntityId, EngineError> {
        debug!(prompt, "等待拾取实体");
        self.picks
            .pop_front()
            .flatten()
            .ok_or(EngineError::UserCancelledSelection)
    }

    fn database(&self) -> &Database {
        &self.database
    }

    fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }
}

#[cfg(test)]
mod tests {
    use psxform_core::geometry::Point3;

    use super::*;

    fn session_with_viewport() -> MemorySession {
        let mut session = MemorySession::paper_layout(Viewport {
            id: ViewportId::new(1),
            number: OVERVIEW_VIEWPORT_NUMBER,
            view: ViewDescriptor::plan(Point3::ORIGIN),
        });
        session.add_viewport(Viewport {
            id: ViewportId::new(2),
            number: 2,
            view: ViewDescriptor::plan(Point3::new(5.0, 5.0, 0.0)),
        });
        session
    }

    #[test]
    fn with_space_restores_after_success_and_error() {
        let mut session = session_with_viewport();

        let number = with_space(&mut session, Space::Model, |s| {
            assert_eq!(s.active_space(), Space::Model);
            Ok(s.current_viewport().number)
        })
        .unwrap();
        assert_eq!(number, 2);
        assert_eq!(session.active_space(), Space::Paper);

        let err = with_space(&mut session, Space::Model, |_| -> Result<(), EngineError> {
            Err(EngineError::UserCancelledSelection)
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::UserCancelledSelection));
        assert_eq!(session.active_space(), Space::Paper);
    }

    #[test]
    fn with_space_skips_switch_when_already_there() {
        let mut session = session_with_viewport();
        with_space(&mut session, Space::Paper, |_| Ok(())).unwrap();
        assert_eq!(session.model_switch_attempts(), 0);
    }

    #[test]
    fn scope_restores_on_drop() {
        let mut session = session_with_viewport();
        {
            let scope = SpaceScope::enter(&mut session, Space::Model).unwrap();
            assert_eq!(scope.active_space(), Space::Model);
        }
        assert_eq!(session.active_space(), Space::Paper);
    }

    #[test]
    fn failed_switch_leaves_space_untouched() {
        let mut session = session_with_viewport();
        session.block_model_switch(true);
        let err = with_space(&mut session, Space::Model, |_| Ok(())).unwrap_err();
        assert!(matches!(err, EngineError::SpaceSwitch { .. }));
        assert_eq!(session.active_space(), Space::Paper);
    }

    #[test]
    fn restore_failure_after_success_is_returned() {
        let mut session = session_with_viewport();
        let err = with_space(&mut session, Space::Model, |s| {
            s.block_paper_switch(true);
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::SpaceSwitch {
                target: Space::Paper,
                ..
            }
        ));
        assert_eq!(session.active_space(), Space::Model);
    }

    #[test]
    fn operation_error_wins_over_restore_failure() {
        let mut session = session_with_viewport();
        let err = with_space(&mut session, Space::Model, |s| -> Result<(), EngineError> {
            s.block_paper_switch(true);
            Err(EngineError::UserCancelledSelection)
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::UserCancelledSelection));
        assert_eq!(session.active_space(), Space::Model);

        // 解除阻塞后可以正常回到图纸空间
        session.block_paper_switch(false);
        session.switch_to_paper_space().unwrap();
        assert_eq!(session.active_space(), Space::Paper);
    }

    #[test]
    fn cancelled_pick_is_reported() {
        let mut session = session_with_viewport();
        session.queue_pick(None);
        assert!(matches!(
            session.pick_entity("pick"),
            Err(EngineError::UserCancelledSelection)
        ));
        // 队列耗尽同样视为取消
        assert!(matches!(
            session.pick_entity("pick"),
            Err(EngineError::UserCancelledSelection)
        ));
    }
}
