pub mod apply;
pub mod command;
pub mod database;
pub mod frames;
pub mod markup;
pub mod session;

pub mod errors {
    use psxform_core::entity::Space;
    use psxform_core::errors::GeometryError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("command requires a paper space layout")]
        NotInPaperSpace,
        #[error("cannot resolve the active viewport: {reason}")]
        CannotResolveActiveViewport {
            reason: String,
            #[source]
            source: Option<Box<EngineError>>,
        },
        #[error("entity selection was cancelled")]
        UserCancelledSelection,
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error("cannot switch to {target:?} space: {reason}")]
        SpaceSwitch { target: Space, reason: String },
        #[error("{count} viewports are registered and none was specified or focused")]
        AmbiguousViewport { count: usize },
        #[error("viewport {0} is not registered with the viewer")]
        UnknownViewport(u64),
        #[error("viewer has no page-to-model transform for viewport {0}")]
        MissingPageTransform(u64),
        #[error(transparent)]
        Geometry(#[from] GeometryError),
    }
}
