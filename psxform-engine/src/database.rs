use psxform_core::entity::{Entity, EntityId, Space};
use tracing::debug;

use crate::errors::EngineError;

/// 按空间分组保存实体的内存数据库。
#[derive(Debug, Default, Clone)]
pub struct Database {
    model: Vec<(EntityId, Entity)>,
    paper: Vec<(EntityId, Entity)>,
    next_entity_id: u64,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接追加实体（不经事务），用于构建初始文档。
    pub fn add_entity(&mut self, space: Space, entity: Entity) -> EntityId {
        let id = EntityId::new(self.next_entity_id);
        self.insert(space, id, entity);
        id
    }

    pub fn entity(&self, id: EntityId) -> Option<(Space, &Entity)> {
        self.model
            .iter()
            .map(|(eid, entity)| (Space::Model, eid, entity))
            .chain(
                self.paper
                    .iter()
                    .map(|(eid, entity)| (Space::Paper, eid, entity)),
            )
            .find(|(_, eid, _)| **eid == id)
            .map(|(space, _, entity)| (space, entity))
    }

    pub fn entities(&self, space: Space) -> impl Iterator<Item = &(EntityId, Entity)> {
        self.collection(space).iter()
    }

    #[inline]
    pub fn count(&self, space: Space) -> usize {
        self.collection(space).len()
    }

    fn collection(&self, space: Space) -> &Vec<(EntityId, Entity)> {
        match space {
            Space::Model => &self.model,
            Space::Paper => &self.paper,
        }
    }

    fn insert(&mut self, space: Space, id: EntityId, entity: Entity) {
        let collection = match space {
            Space::Model => &mut self.model,
            Space::Paper => &mut self.paper,
        };
        collection.push((id, entity));
        self.next_entity_id = self.next_entity_id.max(id.get() + 1);
    }
}

/// 作用域事务：只有显式 `commit` 才会写回数据库，提前 drop 即丢弃全部改动。
pub struct Transaction<'a> {
    database: &'a mut Database,
    pending: Vec<(Space, EntityId, Entity)>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub fn start(database: &'a mut Database) -> Self {
        Self {
            database,
            pending: Vec::new(),
            committed: false,
        }
    }

    /// 读取已提交的实体。未提交的追加对读取不可见。
    pub fn get_object(&self, id: EntityId) -> Result<&Entity, EngineError> {
        self.database
            .entity(id)
            .map(|(_, entity)| entity)
            .ok_or(EngineError::EntityNotFound(id.get()))
    }

    /// 登记一个待追加的实体，返回提交后将使用的 ID。
    pub fn append(&mut self, space: Space, entity: Entity) -> EntityId {
        let id = EntityId::new(self.database.next_entity_id + self.pending.len() as u64);
        self.pending.push((space, id, entity));
        id
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 一次性写回全部待追加实体。
    pub fn commit(mut self) -> Vec<EntityId> {
        let pending = std::mem::take(&mut self.pending);
        let ids = pending.iter().map(|(_, id, _)| *id).collect();
        for (space, id, entity) in pending {
            self.database.insert(space, id, entity);
        }
        self.committed = true;
        ids
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.pending.is_empty() {
            debug!(discarded = self.pending.len(), "事务未提交，丢弃待追加实体");
        }
    }
}

#[cfg(test)]
mod tests {
    use psxform_core::geometry::Point3;

    use super::*;

    fn sample_line() -> Entity {
        Entity::line(Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0), "0")
    }

    #[test]
    fn committed_appends_become_visible() {
        let mut db = Database::new();
        let source = db.add_entity(Space::Paper, sample_line());

        let mut tr = Transaction::start(&mut db);
        assert!(tr.get_object(source).is_ok());
        let reserved = tr.append(Space::Model, sample_line());
        assert_eq!(tr.pending_len(), 1);
        let ids = tr.commit();

        assert_eq!(ids, vec![reserved]);
        assert_eq!(db.count(Space::Model), 1);
        assert_eq!(db.entity(reserved).map(|(space, _)| space), Some(Space::Model));
        assert_eq!(db.add_entity(Space::Paper, sample_line()).get(), reserved.get() + 1);
    }

    #[test]
    fn dropped_transaction_discards_pending_work() {
        let mut db = Database::new();
        db.add_entity(Space::Paper, sample_line());
        {
            let mut tr = Transaction::start(&mut db);
            tr.append(Space::Model, sample_line());
            tr.append(Space::Model, sample_line());
        }
        assert_eq!(db.count(Space::Model), 0);
        assert_eq!(db.count(Space::Paper), 1);
    }

    #[test]
    fn missing_entity_is_reported() {
        let mut db = Database::new();
        let tr = Transaction::start(&mut db);
        let err = tr.get_object(EntityId::new(42)).unwrap_err();
        assert!(matches!(err, EngineError::EntityNotFound(42)));
    }
}
