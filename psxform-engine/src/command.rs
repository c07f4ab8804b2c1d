use std::collections::HashMap;

use psxform_core::entity::ColorIndex;
use psxform_core::transform::AffineTransform;
use tracing::{info, warn};

use crate::apply::copy_to_model_space;
use crate::errors::EngineError;
use crate::frames;
use crate::session::EditingSession;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    fn from_error(command: &str, err: &EngineError) -> Self {
        warn!(command, error = %err, "命令执行失败");
        Self::err(err.to_string())
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a mut dyn EditingSession,
    /// 复制到模型空间的实体所使用的颜色。
    pub highlight: ColorIndex,
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(DrawMarkupCommand);
        for frame in [
            FrameKind::UcsToWcs,
            FrameKind::WcsToUcs,
            FrameKind::DcsToWcs,
            FrameKind::PsdcsToWcs,
        ] {
            bus.register(ReportFrameCommand(frame));
        }
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

/// 拾取图纸空间实体，并把变换后的副本追加到模型空间。
struct DrawMarkupCommand;

impl DrawMarkupCommand {
    const PROMPT: &'static str = "Pick markup entity in PS";
}

impl CommandHandler for DrawMarkupCommand {
    fn name(&self) -> &'static str {
        "drawmarkup"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let session = &mut *context.session;
        if !session.is_paper_layout() {
            return CommandResponse::from_error(self.name(), &EngineError::NotInPaperSpace);
        }
        let picked = match session.pick_entity(Self::PROMPT) {
            Ok(id) => id,
            Err(EngineError::UserCancelledSelection) => {
                info!("用户取消拾取，命令中止");
                return CommandResponse::ok("已取消");
            }
            Err(err) => return CommandResponse::from_error(self.name(), &err),
        };
        match copy_to_model_space(session, &[picked], context.highlight) {
            Ok(appended) => {
                let ids: Vec<String> = appended.iter().map(|a| a.id.get().to_string()).collect();
                CommandResponse::ok(format!("已复制到模型空间: {}", ids.join(", ")))
            }
            Err(err) => CommandResponse::from_error(self.name(), &err),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FrameKind {
    UcsToWcs,
    WcsToUcs,
    DcsToWcs,
    PsdcsToWcs,
}

/// 输出指定坐标系变换矩阵。
struct ReportFrameCommand(FrameKind);

impl ReportFrameCommand {
    fn resolve(&self, session: &mut dyn EditingSession) -> Result<AffineTransform, EngineError> {
        match self.0 {
            FrameKind::UcsToWcs => Ok(frames::ucs_to_wcs(&*session)),
            FrameKind::WcsToUcs => frames::wcs_to_ucs(&*session),
            FrameKind::DcsToWcs => frames::dcs_to_wcs(session),
            FrameKind::PsdcsToWcs => frames::psdcs_to_wcs(session),
        }
    }
}

impl CommandHandler for ReportFrameCommand {
    fn name(&self) -> &'static str {
        match self.0 {
            FrameKind::UcsToWcs => "ucs2wcs",
            FrameKind::WcsToUcs => "wcs2ucs",
            FrameKind::DcsToWcs => "dcs2wcs",
            FrameKind::PsdcsToWcs => "psdcs2wcs",
        }
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match self.resolve(&mut *context.session) {
            Ok(xform) => CommandResponse::ok(xform.to_string()),
            Err(err) => CommandResponse::from_error(self.name(), &err),
        }
    }
}
