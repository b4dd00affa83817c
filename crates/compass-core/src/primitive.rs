//! 图元定义
//!
//! 构造图中的节点：
//! - 自由点 (FreePoint)
//! - 交点 (IntersectionPoint)
//! - 两点直线 (Line)
//! - 圆心+圆上点的圆 (Circle)
//!
//! 图元只能由 [`Registry`](crate::registry::Registry) 创建和销毁；
//! 父图元在构造时固定，因此层级在图元生命周期内不变。

use crate::error::{CoreError, Result};
use crate::geometry::{CircleGeometry, CurveGeometry, LineGeometry};
use crate::math::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 图元ID（从 1 开始的稠密正整数，销毁后按 LIFO 复用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrimitiveId(pub u32);

impl PrimitiveId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 交点选择提示：候选数量 -> 选中的候选索引
///
/// 同一候选数量再次出现时沿用之前的分支，避免曲线连续运动时交点在分支间跳变。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(usize, usize)>", into = "Vec<(usize, usize)>")]
pub struct Hints(BTreeMap<usize, usize>);

impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定候选数量下记录的索引
    pub fn get(&self, candidate_count: usize) -> Option<usize> {
        self.0.get(&candidate_count).copied()
    }

    pub fn insert(&mut self, candidate_count: usize, index: usize) {
        self.0.insert(candidate_count, index);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.0.iter().map(|(&count, &index)| (count, index))
    }

    /// 是否存在相同的 (候选数量, 索引) 条目
    pub fn conflicts_with(&self, other: &Hints) -> bool {
        self.iter().any(|(count, index)| other.get(count) == Some(index))
    }
}

impl From<Vec<(usize, usize)>> for Hints {
    fn from(entries: Vec<(usize, usize)>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<Hints> for Vec<(usize, usize)> {
    fn from(hints: Hints) -> Self {
        hints.0.into_iter().collect()
    }
}

impl FromIterator<(usize, usize)> for Hints {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 图元类型标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTag {
    FreePoint,
    IntersectionPoint,
    Line,
    Circle,
}

impl PrimitiveTag {
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveTag::FreePoint => "FreePoint",
            PrimitiveTag::IntersectionPoint => "IntersectionPoint",
            PrimitiveTag::Line => "Line",
            PrimitiveTag::Circle => "Circle",
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, PrimitiveTag::FreePoint | PrimitiveTag::IntersectionPoint)
    }

    pub fn is_curve(&self) -> bool {
        !self.is_point()
    }
}

/// 自由点：位置可直接设置，是约束的源头
#[derive(Debug, Clone, PartialEq)]
pub struct FreePoint {
    pub position: Vector2,
}

/// 交点：位置由两条父曲线的交点推导
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionPoint {
    /// 上一次求解的位置（无效时保留最后的有效值或构造时的近似值）
    pub position: Vector2,
    pub hints: Hints,
}

/// 两点直线：parents = [point0, point1]
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub geometry: LineGeometry,
}

/// 圆：parents = [center, edge]
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub geometry: CircleGeometry,
}

/// 图元变体（封闭集合，新增变体需同时扩展所有 match）
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveKind {
    FreePoint(FreePoint),
    IntersectionPoint(IntersectionPoint),
    Line(Line),
    Circle(Circle),
}

impl PrimitiveKind {
    pub fn tag(&self) -> PrimitiveTag {
        match self {
            PrimitiveKind::FreePoint(_) => PrimitiveTag::FreePoint,
            PrimitiveKind::IntersectionPoint(_) => PrimitiveTag::IntersectionPoint,
            PrimitiveKind::Line(_) => PrimitiveTag::Line,
            PrimitiveKind::Circle(_) => PrimitiveTag::Circle,
        }
    }
}

/// 图元
#[derive(Debug, Clone)]
pub struct Primitive {
    pub(crate) id: PrimitiveId,
    pub(crate) parents: Vec<PrimitiveId>,
    pub(crate) children: Vec<PrimitiveId>,
    pub(crate) level: u32,
    pub(crate) is_invalid: bool,
    pub(crate) is_selectable: bool,
    pub(crate) kind: PrimitiveKind,
}

impl Primitive {
    pub(crate) fn new(
        id: PrimitiveId,
        parents: Vec<PrimitiveId>,
        level: u32,
        kind: PrimitiveKind,
    ) -> Self {
        Self {
            id,
            parents,
            children: Vec::new(),
            level,
            is_invalid: false,
            is_selectable: true,
            kind,
        }
    }

    pub fn id(&self) -> PrimitiveId {
        self.id
    }

    /// 父图元（构造时固定）
    pub fn parents(&self) -> &[PrimitiveId] {
        &self.parents
    }

    /// 子图元（非拥有的反向引用，按连接顺序）
    pub fn children(&self) -> &[PrimitiveId] {
        &self.children
    }

    /// 拓扑层级：无父图元为 0，否则为父图元最大层级 + 1
    pub fn level(&self) -> u32 {
        self.level
    }

    /// 当前几何定义是否无解
    pub fn is_invalid(&self) -> bool {
        self.is_invalid
    }

    pub fn is_selectable(&self) -> bool {
        self.is_selectable
    }

    pub fn kind(&self) -> &PrimitiveKind {
        &self.kind
    }

    pub fn tag(&self) -> PrimitiveTag {
        self.kind.tag()
    }

    /// 点图元的位置
    pub fn position(&self) -> Option<Vector2> {
        match &self.kind {
            PrimitiveKind::FreePoint(p) => Some(p.position),
            PrimitiveKind::IntersectionPoint(p) => Some(p.position),
            PrimitiveKind::Line(_) | PrimitiveKind::Circle(_) => None,
        }
    }

    /// 曲线图元的几何
    pub fn curve(&self) -> Option<CurveGeometry> {
        match &self.kind {
            PrimitiveKind::Line(l) => Some(CurveGeometry::Line(l.geometry)),
            PrimitiveKind::Circle(c) => Some(CurveGeometry::Circle(c.geometry)),
            PrimitiveKind::FreePoint(_) | PrimitiveKind::IntersectionPoint(_) => None,
        }
    }

    /// 图元上距离 `position` 最近的点
    pub fn closest_point(&self, position: &Vector2) -> Vector2 {
        match (self.position(), self.curve()) {
            (Some(p), _) => p,
            (None, Some(curve)) => curve.closest_point(position),
            (None, None) => *position,
        }
    }

    /// 到 `position` 的距离平方
    pub fn dist_sq(&self, position: &Vector2) -> f64 {
        (self.closest_point(position) - position).norm_squared()
    }

    /// 曲线在 `position` 处的切向
    pub fn tangent_at(&self, position: &Vector2) -> Result<Vector2> {
        self.curve()
            .map(|curve| curve.tangent_at(position))
            .ok_or(CoreError::NotImplemented("tangent of a point primitive"))
    }

    pub(crate) fn require_curve(&self) -> Result<CurveGeometry> {
        self.curve().ok_or(CoreError::KindMismatch {
            id: self.id,
            expected: "curve",
            actual: self.tag(),
        })
    }

    pub(crate) fn require_point(&self) -> Result<Vector2> {
        self.position().ok_or(CoreError::KindMismatch {
            id: self.id,
            expected: "point",
            actual: self.tag(),
        })
    }
}
