use psxform_engine::errors::EngineError;
use psxform_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("标注事件处理失败: {0}")]
    Markup(#[from] EngineError),
    #[error("写出投影结果失败: {0}")]
    Report(#[from] IoError),
}
