//! 图元注册表
//!
//! 注册表独占所有图元实例，负责：
//! - 分配与回收ID（LIFO 复用，保证重放相同操作序列得到相同ID）
//! - 按无序曲线对缓存交点，用于去重
//! - 变更事务（失效 → 按层级重算），见 [`transaction`](crate::transaction)
//! - 发布“变更前”和“创建后”事件

use crate::config::CoreConfig;
use crate::error::{CoreError, ExpectationFailure, ProtocolViolation, Result};
use crate::geometry::{CircleGeometry, CurveGeometry, LineGeometry};
use crate::intersection::select_intersection;
use crate::math::{Vector2, EPSILON};
use crate::primitive::{
    Circle, FreePoint, Hints, IntersectionPoint, Line, Primitive, PrimitiveId, PrimitiveKind,
};
use crate::transaction::{Phase, Transaction, TransactionState};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// 交点缓存键：无序曲线对，按 (较小ID, 较大ID) 存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey(PrimitiveId, PrimitiveId);

impl PairKey {
    pub fn new(a: PrimitiveId, b: PrimitiveId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn low(&self) -> PrimitiveId {
        self.0
    }

    pub fn high(&self) -> PrimitiveId {
        self.1
    }
}

/// 交点查找结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionLookup {
    pub id: PrimitiveId,
    /// 是否复用了缓存中已存在的交点
    pub is_existing: bool,
}

/// 事件监听器
pub type Listener = Box<dyn FnMut(&Primitive)>;

/// 监听器ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    before_change: Vec<(ListenerId, Listener)>,
    after_create: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    fn next(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

/// 图元注册表
pub struct Registry {
    /// ID -> 图元（唯一的拥有集合）
    pub(crate) primitives: BTreeMap<PrimitiveId, Primitive>,

    /// 可复用的ID栈
    free_ids: Vec<PrimitiveId>,

    /// 下一个新ID
    next_id: u32,

    /// 曲线对 -> 交点
    intersections: HashMap<PairKey, Vec<PrimitiveId>>,

    /// 进行中的事务
    pub(crate) transaction: TransactionState,

    listeners: Listeners,

    config: CoreConfig,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("primitives", &self.primitives.len())
            .field("free_ids", &self.free_ids)
            .field("next_id", &self.next_id)
            .field("intersections", &self.intersections)
            .field("transaction", &self.transaction)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// 创建空注册表（默认配置）
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        Self {
            primitives: BTreeMap::new(),
            free_ids: Vec::new(),
            next_id: 1,
            intersections: HashMap::new(),
            transaction: TransactionState::default(),
            listeners: Listeners::default(),
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // === 查询 ===

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn contains(&self, id: PrimitiveId) -> bool {
        self.primitives.contains_key(&id)
    }

    /// 按ID查找
    pub fn get(&self, id: PrimitiveId) -> Result<&Primitive> {
        self.primitives.get(&id).ok_or(CoreError::NotFound(id))
    }

    pub fn try_get(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.primitives.get(&id)
    }

    /// 所有存活图元（按ID升序）
    pub fn iter(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = PrimitiveId> + '_ {
        self.primitives.keys().copied()
    }

    /// 是否处于事务中
    pub fn is_editing(&self) -> bool {
        self.transaction.phase != Phase::Idle
    }

    pub fn phase(&self) -> Phase {
        self.transaction.phase
    }

    /// 缓存中属于曲线对 (a, b) 的交点
    pub fn intersection_points(&self, a: PrimitiveId, b: PrimitiveId) -> &[PrimitiveId] {
        self.intersections
            .get(&PairKey::new(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// `id` 是否依赖 `other`（即 `id` 是 `other` 的后代）
    ///
    /// 从 `other` 沿子图元广度优先搜索；层级不小于 `id` 的节点不可能是其祖先，直接剪枝。
    pub fn depends_on(&self, id: PrimitiveId, other: PrimitiveId) -> Result<bool> {
        let level = self.get(id)?.level;
        self.get(other)?;

        let mut seen = HashSet::from([other]);
        let mut queue = VecDeque::from([other]);
        while let Some(current) = queue.pop_front() {
            let Some(node) = self.primitives.get(&current) else {
                continue;
            };
            if node.level >= level {
                continue;
            }
            for &child in &node.children {
                if child == id {
                    return Ok(true);
                }
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        Ok(false)
    }

    pub fn is_independent_of(&self, id: PrimitiveId, other: PrimitiveId) -> Result<bool> {
        self.depends_on(id, other).map(|depends| !depends)
    }

    /// 命中测试：容差内最近的可选、有效图元，距离相同时点优先
    pub fn pick(&self, position: &Vector2, tolerance: Option<f64>) -> Option<PrimitiveId> {
        let tolerance = tolerance.unwrap_or(self.config.pick_tolerance);
        let limit = tolerance * tolerance;

        let mut best: Option<(f64, bool, PrimitiveId)> = None;
        for primitive in self.primitives.values() {
            if !primitive.is_selectable || primitive.is_invalid {
                continue;
            }
            let d = primitive.dist_sq(position);
            if d > limit {
                continue;
            }
            let is_curve = primitive.tag().is_curve();
            let better = match best {
                None => true,
                Some((best_d, best_is_curve, _)) => {
                    d < best_d - EPSILON
                        || ((d - best_d).abs() <= EPSILON && best_is_curve && !is_curve)
                }
            };
            if better {
                best = Some((d, is_curve, primitive.id));
            }
        }
        best.map(|(_, _, id)| id)
    }

    // === 创建 ===

    /// 创建自由点
    pub fn create_point(&mut self, position: Vector2) -> Result<PrimitiveId> {
        self.ensure_idle()?;
        Ok(self.insert(vec![], PrimitiveKind::FreePoint(FreePoint { position })))
    }

    /// 创建过两点的直线
    pub fn create_line(&mut self, p0: PrimitiveId, p1: PrimitiveId) -> Result<PrimitiveId> {
        self.ensure_idle()?;
        let a = self.get(p0)?.require_point()?;
        let b = self.get(p1)?.require_point()?;
        let geometry = LineGeometry::through(&a, &b);
        Ok(self.insert(vec![p0, p1], PrimitiveKind::Line(Line { geometry })))
    }

    /// 创建圆心 + 圆上点定义的圆
    pub fn create_circle(&mut self, center: PrimitiveId, edge: PrimitiveId) -> Result<PrimitiveId> {
        self.ensure_idle()?;
        let c = self.get(center)?.require_point()?;
        let e = self.get(edge)?.require_point()?;
        let geometry = CircleGeometry::through(&c, &e);
        Ok(self.insert(vec![center, edge], PrimitiveKind::Circle(Circle { geometry })))
    }

    /// 获取或创建两条曲线的交点
    ///
    /// - 找到位置且缓存中已有相同位置的交点：返回已有交点
    /// - 没有解且未声明 `invalid`：返回 `None`，不创建
    /// - 没有解且声明 `invalid`（反序列化无效交点）：必须提供提示，且不能与已有无效交点冲突
    pub fn try_get_or_create_intersection_point(
        &mut self,
        a: PrimitiveId,
        b: PrimitiveId,
        approximate: Vector2,
        hints: Option<Hints>,
        invalid: bool,
    ) -> Result<Option<IntersectionLookup>> {
        self.ensure_idle()?;

        let (low, high) = self.solve_order(a, b)?;
        let first = self.get(low)?;
        let second = self.get(high)?;
        let curve_low = first.require_curve()?;
        let curve_high = second.require_curve()?;
        let parents_invalid = first.is_invalid || second.is_invalid;

        let mut working = hints.clone().unwrap_or_default();
        let position = if parents_invalid {
            None
        } else {
            select_intersection(&curve_low, &curve_high, &approximate, &mut working).position
        };

        let key = PairKey::new(a, b);
        match (position, invalid) {
            (Some(_), true) => Err(ExpectationFailure::UnexpectedIntersection { a, b }.into()),
            (None, false) => Ok(None),
            (Some(position), false) => {
                let existing = self
                    .cached(key)
                    .find(|p| !p.is_invalid && p.position() == Some(position));
                if let Some(existing) = existing {
                    return Ok(Some(IntersectionLookup {
                        id: existing.id,
                        is_existing: true,
                    }));
                }
                let id = self.insert_intersection(key, [a, b], position, working);
                Ok(Some(IntersectionLookup {
                    id,
                    is_existing: false,
                }))
            }
            (None, true) => {
                let hints = hints.ok_or(ExpectationFailure::MissingHints)?;
                let conflicting = self.cached(key).any(|p| match &p.kind {
                    PrimitiveKind::IntersectionPoint(point) => {
                        p.is_invalid && point.hints.conflicts_with(&hints)
                    }
                    _ => false,
                });
                if conflicting {
                    return Err(ExpectationFailure::ConflictingInvalidPoints { a, b }.into());
                }
                let id = self.insert_intersection(key, [a, b], approximate, hints);
                Ok(Some(IntersectionLookup {
                    id,
                    is_existing: false,
                }))
            }
        }
    }

    /// 批量销毁：按层级降序，保证子图元先于祖先销毁
    pub fn dispose(&mut self, ids: &[PrimitiveId]) -> Result<()> {
        let mut ordered = Vec::with_capacity(ids.len());
        for &id in ids {
            let primitive = self
                .primitives
                .get(&id)
                .ok_or_else(|| self.missing(id, ProtocolViolation::AlreadyDisposed(id)))?;
            ordered.push((primitive.level, id));
        }
        ordered.sort_by(|a, b| b.cmp(a));

        self.edit(|tx| {
            for (_, id) in ordered {
                tx.dispose(id)?;
            }
            Ok(())
        })
    }

    /// 变更事务：运行 `f`，结束时（无论成功、失败还是 panic）按层级重算所有失效图元
    pub fn edit<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut tx = Transaction::open(self)?;
        let result = f(&mut tx);
        drop(tx);
        result
    }

    // === 事件 ===

    /// 订阅“变更前”事件（事务中每个新失效的图元按发现顺序触发）
    pub fn on_before_change(&mut self, listener: impl FnMut(&Primitive) + 'static) -> ListenerId {
        let id = self.listeners.next();
        self.listeners.before_change.push((id, Box::new(listener)));
        id
    }

    /// 订阅“创建后”事件
    pub fn on_after_create(&mut self, listener: impl FnMut(&Primitive) + 'static) -> ListenerId {
        let id = self.listeners.next();
        self.listeners.after_create.push((id, Box::new(listener)));
        id
    }

    /// 取消订阅
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.before_change.len() + self.listeners.after_create.len();
        self.listeners.before_change.retain(|(lid, _)| *lid != id);
        self.listeners.after_create.retain(|(lid, _)| *lid != id);
        before != self.listeners.before_change.len() + self.listeners.after_create.len()
    }

    pub(crate) fn emit_before_change(&mut self, id: PrimitiveId) {
        if let Some(primitive) = self.primitives.get(&id) {
            for (_, listener) in self.listeners.before_change.iter_mut() {
                listener(primitive);
            }
        }
    }

    fn emit_after_create(&mut self, id: PrimitiveId) {
        if let Some(primitive) = self.primitives.get(&id) {
            for (_, listener) in self.listeners.after_create.iter_mut() {
                listener(primitive);
            }
        }
    }

    // === 内部 ===

    pub(crate) fn ensure_idle(&self) -> Result<()> {
        if self.transaction.phase != Phase::Idle {
            return Err(ProtocolViolation::TransactionOpen.into());
        }
        Ok(())
    }

    /// 曾经分配过但已不存活的ID视为已销毁，否则为未知ID
    pub(crate) fn missing(&self, id: PrimitiveId, violation: ProtocolViolation) -> CoreError {
        if id.0 >= 1 && id.0 < self.next_id {
            violation.into()
        } else {
            CoreError::NotFound(id)
        }
    }

    /// 求交时两条曲线的固定顺序：按 (层级, ID) 升序
    ///
    /// 同一曲线对无论以何种顺序传入，求解的浮点运算和候选顺序都相同。
    /// 快照恢复后层级不变、同层ID的相对顺序不变，保存的提示仍指向同一分支。
    fn solve_order(&self, a: PrimitiveId, b: PrimitiveId) -> Result<(PrimitiveId, PrimitiveId)> {
        let key = PairKey::new(a, b);
        let low = self.get(key.low())?.level;
        let high = self.get(key.high())?.level;
        if high < low {
            Ok((key.high(), key.low()))
        } else {
            Ok((key.low(), key.high()))
        }
    }

    fn cached(&self, key: PairKey) -> impl Iterator<Item = &Primitive> + '_ {
        self.intersections
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.primitives.get(id))
    }

    fn allocate_id(&mut self) -> PrimitiveId {
        if let Some(id) = self.free_ids.pop() {
            return id;
        }
        let id = PrimitiveId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, parents: Vec<PrimitiveId>, kind: PrimitiveKind) -> PrimitiveId {
        let id = self.allocate_id();
        let level = parents
            .iter()
            .filter_map(|parent| self.primitives.get(parent))
            .map(|parent| parent.level + 1)
            .max()
            .unwrap_or(0);

        for parent in &parents {
            if let Some(parent) = self.primitives.get_mut(parent) {
                if !parent.children.contains(&id) {
                    parent.children.push(id);
                }
            }
        }

        let primitive = Primitive::new(id, parents, level, kind);
        let tag = primitive.tag();
        self.primitives.insert(id, primitive);
        self.apply_constraints(id);

        tracing::debug!(%id, ?tag, level, "primitive created");
        self.emit_after_create(id);
        id
    }

    fn insert_intersection(
        &mut self,
        key: PairKey,
        parents: [PrimitiveId; 2],
        position: Vector2,
        hints: Hints,
    ) -> PrimitiveId {
        let id = self.insert(
            parents.to_vec(),
            PrimitiveKind::IntersectionPoint(IntersectionPoint { position, hints }),
        );
        self.intersections.entry(key).or_default().push(id);
        id
    }

    /// 销毁单个图元（在事务内调用）
    pub(crate) fn dispose_primitive(&mut self, id: PrimitiveId) -> Result<()> {
        let primitive = self
            .primitives
            .get(&id)
            .ok_or_else(|| self.missing(id, ProtocolViolation::AlreadyDisposed(id)))?;
        if !primitive.children.is_empty() {
            return Err(ProtocolViolation::HasChildren {
                id,
                children: primitive.children.len(),
            }
            .into());
        }

        self.begin_changes(id)?;

        let primitive = self.primitives.remove(&id).ok_or(CoreError::NotFound(id))?;
        for parent in &primitive.parents {
            if let Some(parent) = self.primitives.get_mut(parent) {
                parent.children.retain(|child| *child != id);
            }
        }

        if let (PrimitiveKind::IntersectionPoint(_), &[a, b]) =
            (&primitive.kind, primitive.parents.as_slice())
        {
            let key = PairKey::new(a, b);
            if let Some(bucket) = self.intersections.get_mut(&key) {
                bucket.retain(|point| *point != id);
                if bucket.is_empty() {
                    self.intersections.remove(&key);
                }
            }
        }

        self.free_ids.push(id);
        tracing::debug!(%id, tag = ?primitive.tag(), "primitive disposed");
        Ok(())
    }

    fn point_of(&self, id: PrimitiveId) -> Option<Vector2> {
        self.primitives.get(&id).and_then(Primitive::position)
    }

    fn curve_of(&self, id: PrimitiveId) -> Option<CurveGeometry> {
        self.primitives.get(&id).and_then(Primitive::curve)
    }

    /// 根据父图元当前状态重算派生状态，不改变拓扑
    pub(crate) fn apply_constraints(&mut self, id: PrimitiveId) {
        let Some(primitive) = self.primitives.get(&id) else {
            return;
        };
        let parents_invalid = primitive
            .parents
            .iter()
            .any(|parent| self.primitives.get(parent).map_or(true, |p| p.is_invalid));

        let (kind, invalid) = match (&primitive.kind, primitive.parents.as_slice()) {
            (PrimitiveKind::FreePoint(_), _) => return,
            (PrimitiveKind::IntersectionPoint(point), &[a, b]) => {
                let mut point = point.clone();
                let curves = match self.solve_order(a, b) {
                    Ok((low, high)) => self.curve_of(low).zip(self.curve_of(high)),
                    Err(_) => None,
                };
                let selection = match curves {
                    Some((low, high)) if !parents_invalid => {
                        select_intersection(&low, &high, &point.position, &mut point.hints).position
                    }
                    _ => None,
                };
                let invalid = selection.is_none();
                if let Some(position) = selection {
                    point.position = position;
                }
                (PrimitiveKind::IntersectionPoint(point), invalid)
            }
            (PrimitiveKind::Line(line), &[p0, p1]) => match (self.point_of(p0), self.point_of(p1)) {
                (Some(a), Some(b)) => (
                    PrimitiveKind::Line(Line {
                        geometry: LineGeometry::through(&a, &b),
                    }),
                    parents_invalid,
                ),
                _ => (PrimitiveKind::Line(line.clone()), true),
            },
            (PrimitiveKind::Circle(circle), &[center, edge]) => {
                match (self.point_of(center), self.point_of(edge)) {
                    (Some(c), Some(e)) => (
                        PrimitiveKind::Circle(Circle {
                            geometry: CircleGeometry::through(&c, &e),
                        }),
                        parents_invalid,
                    ),
                    _ => (PrimitiveKind::Circle(circle.clone()), true),
                }
            }
            (kind, parents) => {
                tracing::warn!(
                    %id,
                    tag = ?kind.tag(),
                    parents = parents.len(),
                    "unexpected parent count"
                );
                return;
            }
        };

        if let Some(primitive) = self.primitives.get_mut(&id) {
            primitive.kind = kind;
            primitive.is_invalid = invalid;
        }
    }
}
