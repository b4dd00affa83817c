//! 变更事务
//!
//! 状态机：空闲 → 打开 → 重算 → 空闲
//!
//! - [`Registry::edit`](crate::registry::Registry::edit) 打开事务，把 [`Transaction`] 交给调用方
//! - 每次修改图元自身状态前调用 `begin_changes`，沿子图元广度优先标记失效
//! - `Transaction` 被丢弃时（正常返回、返回错误或 panic 展开）按层级升序重算所有失效图元
//!
//! 通知顺序为广度优先的发现顺序，重算顺序为层级顺序，两者刻意不同。

use crate::error::{CoreError, ProtocolViolation, Result};
use crate::math::Vector2;
use crate::primitive::{Primitive, PrimitiveId, PrimitiveKind, PrimitiveTag};
use crate::registry::Registry;
use std::collections::{HashSet, VecDeque};

/// 事务阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Open,
    Recomputing,
}

/// 进行中事务的状态（事务边界处清空）
#[derive(Debug, Default)]
pub(crate) struct TransactionState {
    pub(crate) phase: Phase,
    /// 本事务中被直接修改的图元
    pub(crate) changed: HashSet<PrimitiveId>,
    /// 待重算的图元（发现顺序）
    pub(crate) invalidated: Vec<PrimitiveId>,
    pub(crate) invalidated_set: HashSet<PrimitiveId>,
}

/// 事务句柄：图元状态唯一的修改入口
pub struct Transaction<'r> {
    registry: &'r mut Registry,
}

impl<'r> Transaction<'r> {
    pub(crate) fn open(registry: &'r mut Registry) -> Result<Self> {
        if registry.transaction.phase != Phase::Idle {
            return Err(ProtocolViolation::NestedEdit.into());
        }
        registry.transaction.phase = Phase::Open;
        Ok(Self { registry })
    }

    /// 只读访问注册表
    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn get(&self, id: PrimitiveId) -> Result<&Primitive> {
        self.registry.get(id)
    }

    /// 声明即将修改 `id` 自身的状态
    pub fn begin_changes(&mut self, id: PrimitiveId) -> Result<()> {
        self.registry.begin_changes(id)
    }

    /// 移动自由点
    pub fn set_position(&mut self, id: PrimitiveId, position: Vector2) -> Result<()> {
        if let Some(primitive) = self.registry.try_get(id) {
            if primitive.tag() != PrimitiveTag::FreePoint {
                return Err(CoreError::KindMismatch {
                    id,
                    expected: "free point",
                    actual: primitive.tag(),
                });
            }
        }
        self.registry.begin_changes(id)?;
        if let Some(PrimitiveKind::FreePoint(point)) =
            self.registry.primitives.get_mut(&id).map(|p| &mut p.kind)
        {
            point.position = position;
        }
        Ok(())
    }

    pub fn set_selectable(&mut self, id: PrimitiveId, selectable: bool) -> Result<()> {
        self.registry.begin_changes(id)?;
        if let Some(primitive) = self.registry.primitives.get_mut(&id) {
            primitive.is_selectable = selectable;
        }
        Ok(())
    }

    /// 销毁图元：必须已无子图元
    pub fn dispose(&mut self, id: PrimitiveId) -> Result<()> {
        self.registry.dispose_primitive(id)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.registry.finish_transaction();
    }
}

impl Registry {
    pub(crate) fn begin_changes(&mut self, id: PrimitiveId) -> Result<()> {
        if !self.primitives.contains_key(&id) {
            return Err(self.missing(id, ProtocolViolation::ChangingDisposed(id)));
        }
        debug_assert_eq!(
            self.transaction.phase,
            Phase::Open,
            "begin_changes outside a transaction"
        );

        let state = &self.transaction;
        if state.changed.contains(&id) {
            return Ok(());
        }
        if state.invalidated_set.contains(&id) {
            return Err(ProtocolViolation::ChangingInvalidated(id).into());
        }

        let mut discovered = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if current != id && state.changed.contains(&current) {
                return Err(ProtocolViolation::InvalidatingChanged(current).into());
            }
            if !state.invalidated_set.contains(&current) {
                discovered.push(current);
            }
            if let Some(primitive) = self.primitives.get(&current) {
                for &child in &primitive.children {
                    if seen.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }

        let state = &mut self.transaction;
        for &current in &discovered {
            state.invalidated_set.insert(current);
            state.invalidated.push(current);
        }
        state.changed.insert(id);

        tracing::trace!(%id, invalidated = discovered.len(), "begin changes");
        for current in discovered {
            self.emit_before_change(current);
        }
        Ok(())
    }

    /// 关闭事务：按层级升序重算失效图元，跳过事务中已销毁的图元
    pub(crate) fn finish_transaction(&mut self) {
        self.transaction.phase = Phase::Recomputing;

        let mut pending = std::mem::take(&mut self.transaction.invalidated);
        self.transaction.invalidated_set.clear();
        pending.retain(|id| self.primitives.contains_key(id));
        pending.sort_by_key(|id| self.primitives.get(id).map_or(0, |p| p.level));

        for &id in &pending {
            self.apply_constraints(id);
        }

        self.transaction.changed.clear();
        self.transaction.phase = Phase::Idle;
        tracing::trace!(recomputed = pending.len(), "transaction closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::vec2;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn line_fixture() -> (Registry, PrimitiveId, PrimitiveId, PrimitiveId) {
        let mut registry = Registry::new();
        let a = registry.create_point(vec2(0.0, 0.0)).unwrap();
        let b = registry.create_point(vec2(1.0, 0.0)).unwrap();
        let line = registry.create_line(a, b).unwrap();
        (registry, a, b, line)
    }

    #[test]
    fn test_edit_recomputes_dependents() {
        let (mut registry, a, b, line) = line_fixture();
        registry
            .edit(|tx| tx.set_position(b, vec2(0.0, 3.0)))
            .unwrap();

        let curve = registry.get(line).unwrap().curve().unwrap();
        match curve {
            crate::geometry::CurveGeometry::Line(l) => {
                assert_eq!(l.origin, registry.get(a).unwrap().position().unwrap());
                assert_eq!(l.direction, vec2(0.0, 3.0));
            }
            _ => panic!("expected a line"),
        }
        assert!(!registry.is_editing());
    }

    #[test]
    fn test_nested_edit_rejected() {
        let (mut registry, _, _, _) = line_fixture();
        // 事务句柄独占注册表，只能通过阶段伪造嵌套
        registry.transaction.phase = Phase::Open;
        let err = registry.edit(|_| Ok(())).unwrap_err();
        assert_eq!(err, CoreError::Protocol(ProtocolViolation::NestedEdit));
        registry.transaction.phase = Phase::Idle;
        assert!(registry.edit(|_| Ok(())).is_ok());
    }

    #[test]
    fn test_changing_invalidated_primitive() {
        let mut registry = Registry::new();
        let a = registry.create_point(vec2(0.0, 0.0)).unwrap();
        let b = registry.create_point(vec2(1.0, 0.0)).unwrap();
        let line = registry.create_line(a, b).unwrap();

        let err = registry
            .edit(|tx| {
                tx.set_position(a, vec2(5.0, 5.0))?;
                tx.begin_changes(line)
            })
            .unwrap_err();
        assert_eq!(err, CoreError::Protocol(ProtocolViolation::ChangingInvalidated(line)));
    }

    #[test]
    fn test_invalidating_changed_primitive() {
        let (mut registry, a, _, line) = line_fixture();
        let err = registry
            .edit(|tx| {
                tx.set_selectable(line, false)?;
                tx.set_position(a, vec2(2.0, 2.0))
            })
            .unwrap_err();
        assert_eq!(err, CoreError::Protocol(ProtocolViolation::InvalidatingChanged(line)));
        // 失败的修改未生效，事务状态已清空
        assert_eq!(registry.get(a).unwrap().position(), Some(vec2(0.0, 0.0)));
        assert!(registry.transaction.changed.is_empty());
        assert!(registry.transaction.invalidated.is_empty());
    }

    #[test]
    fn test_repeated_changes_are_noop() {
        let (mut registry, a, _, _) = line_fixture();
        let notified = Rc::new(RefCell::new(Vec::new()));
        let sink = notified.clone();
        registry.on_before_change(move |p| sink.borrow_mut().push(p.id()));

        registry
            .edit(|tx| {
                tx.set_position(a, vec2(1.0, 1.0))?;
                tx.set_position(a, vec2(2.0, 2.0))
            })
            .unwrap();
        assert_eq!(notified.borrow().len(), 2);
        assert_eq!(registry.get(a).unwrap().position(), Some(vec2(2.0, 2.0)));
    }

    #[test]
    fn test_before_change_in_discovery_order() {
        let mut registry = Registry::new();
        let a = registry.create_point(vec2(0.0, 0.0)).unwrap();
        let b = registry.create_point(vec2(4.0, 0.0)).unwrap();
        let c = registry.create_point(vec2(0.0, 4.0)).unwrap();
        let ab = registry.create_line(a, b).unwrap();
        let circle = registry.create_circle(a, c).unwrap();
        let x = registry
            .try_get_or_create_intersection_point(ab, circle, vec2(4.0, 0.0), None, false)
            .unwrap()
            .unwrap()
            .id;

        let notified = Rc::new(RefCell::new(Vec::new()));
        let sink = notified.clone();
        registry.on_before_change(move |p| sink.borrow_mut().push(p.id()));
        registry.edit(|tx| tx.set_position(a, vec2(1.0, 0.0))).unwrap();

        assert_eq!(notified.borrow().as_slice(), &[a, ab, circle, x]);
        // 平移后交点仍在直线与圆上
        let p = registry.get(x).unwrap().position().unwrap();
        assert!((p - vec2(1.0 + 17f64.sqrt(), 0.0)).norm() < 1e-9);
    }

    #[test]
    fn test_changing_disposed_primitive() {
        let (mut registry, _, b, line) = line_fixture();
        registry.dispose(&[line]).unwrap();
        let err = registry.edit(|tx| tx.begin_changes(line)).unwrap_err();
        assert_eq!(err, CoreError::Protocol(ProtocolViolation::ChangingDisposed(line)));
        assert!(registry.edit(|tx| tx.set_position(b, vec2(0.0, 0.0))).is_ok());
    }

    #[test]
    fn test_set_position_rejects_derived_points() {
        let (mut registry, _, _, line) = line_fixture();
        let err = registry.edit(|tx| tx.set_position(line, vec2(0.0, 0.0))).unwrap_err();
        assert!(matches!(err, CoreError::KindMismatch { .. }));
    }
}
