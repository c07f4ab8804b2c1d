use psxform_core::entity::{ColorIndex, EntityId, Space, TransformedGeometry};
use psxform_core::transform::AffineTransform;
use tracing::info;

use crate::errors::EngineError;
use crate::frames::psdcs_to_wcs;
use crate::session::EditingSession;

/// 一次复制后写入目标空间的结果。
#[derive(Debug, Clone)]
pub struct AppendedGeometry {
    pub id: EntityId,
    pub geometry: TransformedGeometry,
}

/// 在单个事务中复制、变换、着色并追加到 `target`。
///
/// 任一步失败都不会提交，目标空间保持调用前的状态。
pub fn copy_transformed<S>(
    session: &mut S,
    sources: &[EntityId],
    xform: &AffineTransform,
    target: Space,
    highlight: ColorIndex,
) -> Result<Vec<AppendedGeometry>, EngineError>
where
    S: EditingSession + ?Sized,
{
    let mut tr = session.begin_transaction();
    let mut appended = Vec::with_capacity(sources.len());
    for &source in sources {
        let copy = tr
            .get_object(source)?
            .transformed(xform)?
            .with_color(highlight);
        let id = tr.append(target, copy.clone());
        appended.push(AppendedGeometry {
            id,
            geometry: TransformedGeometry {
                source,
                entity: copy,
                transform: *xform,
            },
        });
    }
    tr.commit();
    info!(count = appended.len(), ?target, color = highlight.0, "已追加变换副本");
    Ok(appended)
}

/// 将图纸空间实体按 PSDCS→WCS 复制到模型空间。
pub fn copy_to_model_space<S>(
    session: &mut S,
    sources: &[EntityId],
    highlight: ColorIndex,
) -> Result<Vec<AppendedGeometry>, EngineError>
where
    S: EditingSession + ?Sized,
{
    let xform = psdcs_to_wcs(session)?;
    copy_transformed(session, sources, &xform, Space::Model, highlight)
}

#[cfg(test)]
mod tests {
    use glam::{DMat4, DVec3};
    use psxform_core::entity::{Entity, Shape};
    use psxform_core::errors::GeometryError;
    use psxform_core::geometry::{Point2, Point3};
    use psxform_core::view::{OVERVIEW_VIEWPORT_NUMBER, ViewDescriptor, Viewport, ViewportId};

    use super::*;
    use crate::session::MemorySession;

    fn session() -> MemorySession {
        let mut session = MemorySession::paper_layout(Viewport {
            id: ViewportId::new(1),
            number: OVERVIEW_VIEWPORT_NUMBER,
            view: ViewDescriptor::plan(Point3::ORIGIN),
        });
        session.add_viewport(Viewport {
            id: ViewportId::new(2),
            number: 2,
            view: ViewDescriptor {
                custom_scale: 0.5,
                center_point: Point2::new(100.0, 100.0),
                view_center: Point2::new(10.0, 20.0),
                ..ViewDescriptor::plan(Point3::ORIGIN)
            },
        });
        session
    }

    #[test]
    fn paper_line_is_copied_into_model_space() {
        let mut session = session();
        let source = session.database_mut().add_entity(
            Space::Paper,
            Entity::line(
                Point3::new(100.0, 100.0, 0.0),
                Point3::new(101.0, 100.0, 0.0),
                "MARKUP",
            ),
        );

        let appended = copy_to_model_space(&mut session, &[source], ColorIndex::GREEN).unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(session.database().count(Space::Model), 1);
        assert_eq!(session.active_space(), Space::Paper);

        let (space, entity) = session.database().entity(appended[0].id).unwrap();
        assert_eq!(space, Space::Model);
        assert_eq!(entity.color, Some(ColorIndex::GREEN));
        match &entity.shape {
            Shape::Line(line) => {
                // 视口中心点映射到视图中心，图纸 1 单位 = 模型 2 单位
                assert!(line.start.distance(Point3::new(10.0, 20.0, 0.0)) < 1e-9);
                assert!(line.end.distance(Point3::new(12.0, 20.0, 0.0)) < 1e-9);
            }
            other => panic!("expected line, got {other:?}"),
        }

        // 源实体未被修改
        let (_, original) = session.database().entity(source).unwrap();
        assert_eq!(original.color, None);
    }

    #[test]
    fn failure_mid_transaction_leaves_target_unchanged() {
        let mut session = session();
        let line = session.database_mut().add_entity(
            Space::Paper,
            Entity::line(Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0), "0"),
        );
        let circle = session
            .database_mut()
            .add_entity(Space::Paper, Entity::circle(Point3::ORIGIN, 1.0, "0"));
        let before = session.database().count(Space::Model);

        let stretch = AffineTransform::from_matrix(DMat4::from_scale(DVec3::new(2.0, 1.0, 1.0)));
        let err = copy_transformed(
            &mut session,
            &[line, circle],
            &stretch,
            Space::Model,
            ColorIndex::GREEN,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            EngineError::Geometry(GeometryError::NonUniformScale)
        ));
        assert_eq!(session.database().count(Space::Model), before);
    }

    #[test]
    fn missing_source_aborts_without_mutation() {
        let mut session = session();
        let err = copy_to_model_space(&mut session, &[EntityId::new(99)], ColorIndex::GREEN)
            .unwrap_err();
        assert!(matches!(err, EngineError::EntityNotFound(99)));
        assert_eq!(session.database().count(Space::Model), 0);
    }
}
