//! 拖拽协议
//!
//! 每次抓取手势通过 [`Registry::try_drag`] 创建一个拖拽器，随后用一串目标位置反复调用
//! [`Dragger::drag_to`]。取消手势只需停止调用，拖拽器之外不保留任何状态。
//!
//! 拖拽器类型：
//! - 自由拖拽：保持抓取偏移平移点
//! - 不可拖拽：记录阻止拖拽的图元，只跟踪指针位置
//! - 组合拖拽：依次转发给多个子拖拽器
//! - 轴心拖拽：绕固定端点旋转，保持距离
//! - 固定圆心拖拽：圆上点沿固定射线移动，改变半径
//! - 固定圆上点拖拽：圆心沿弦的中垂线移动，圆始终经过固定点

use crate::error::{CoreError, Result};
use crate::math::{midpoint, perp, Vector2, EPSILON};
use crate::primitive::{PrimitiveId, PrimitiveKind};
use crate::registry::Registry;
use crate::transaction::Transaction;

/// 拖拽器
#[derive(Debug, Clone, PartialEq)]
pub enum Dragger {
    Free(FreeDrag),
    Fixed(FixedDrag),
    Compound(CompoundDrag),
    Pivot(PivotDrag),
    FixedCenter(FixedCenterDrag),
    FixedEdge(FixedEdgeDrag),
}

impl Dragger {
    /// 是否可拖拽（在拖拽器生命周期内不变）
    pub fn can_drag(&self) -> bool {
        !matches!(self, Dragger::Fixed(_))
    }

    /// 阻止拖拽的图元（可拖拽时为空）
    pub fn offenses(&self) -> &[PrimitiveId] {
        match self {
            Dragger::Fixed(fixed) => &fixed.offenses,
            _ => &[],
        }
    }

    /// 拖到目标位置；可拖拽时自行打开并关闭一个事务
    pub fn drag_to(&mut self, registry: &mut Registry, target: Vector2) -> Result<()> {
        if let Dragger::Fixed(fixed) = self {
            fixed.position = target;
            return Ok(());
        }
        registry.edit(|tx| self.apply(tx, &target))
    }

    /// 在调用方已打开的事务中拖到目标位置
    pub fn apply(&mut self, tx: &mut Transaction<'_>, target: &Vector2) -> Result<()> {
        match self {
            Dragger::Free(drag) => drag.apply(tx, target),
            Dragger::Fixed(drag) => {
                drag.position = *target;
                Ok(())
            }
            Dragger::Compound(drag) => drag.apply(tx, target),
            Dragger::Pivot(drag) => drag.apply(tx, target),
            Dragger::FixedCenter(drag) => drag.apply(tx, target),
            Dragger::FixedEdge(drag) => drag.apply(tx, target),
        }
    }
}

/// 自由拖拽：位置 = 目标 - 抓取偏移
#[derive(Debug, Clone, PartialEq)]
pub struct FreeDrag {
    point: PrimitiveId,
    offset: Vector2,
}

impl FreeDrag {
    pub fn new(point: PrimitiveId, offset: Vector2) -> Self {
        Self { point, offset }
    }

    pub fn point(&self) -> PrimitiveId {
        self.point
    }

    fn apply(&mut self, tx: &mut Transaction<'_>, target: &Vector2) -> Result<()> {
        tx.set_position(self.point, target - self.offset)
    }
}

/// 不可拖拽
#[derive(Debug, Clone, PartialEq)]
pub struct FixedDrag {
    offenses: Vec<PrimitiveId>,
    position: Vector2,
}

impl FixedDrag {
    pub fn new(offenses: Vec<PrimitiveId>, position: Vector2) -> Self {
        Self { offenses, position }
    }

    /// 最近一次指针位置（用于界面提示）
    pub fn position(&self) -> Vector2 {
        self.position
    }
}

/// 组合拖拽
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundDrag {
    parts: Vec<Dragger>,
}

impl CompoundDrag {
    pub fn new(parts: Vec<Dragger>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Dragger] {
        &self.parts
    }

    fn apply(&mut self, tx: &mut Transaction<'_>, target: &Vector2) -> Result<()> {
        for part in &mut self.parts {
            part.apply(tx, target)?;
        }
        Ok(())
    }
}

/// 轴心拖拽：被拖端点保持到轴心的距离
#[derive(Debug, Clone, PartialEq)]
pub struct PivotDrag {
    pivot: Vector2,
    distance: f64,
    /// 抓取点与原位置在轴心同侧为 1，否则为 -1
    side: f64,
    guard_ratio: f64,
    moving: Box<Dragger>,
}

impl PivotDrag {
    pub fn new(
        pivot: Vector2,
        original: Vector2,
        grab: Vector2,
        guard_ratio: f64,
        moving: Dragger,
    ) -> Self {
        let arm = original - pivot;
        let side = if (grab - pivot).dot(&arm) < 0.0 { -1.0 } else { 1.0 };
        Self {
            pivot,
            distance: arm.norm(),
            side,
            guard_ratio,
            moving: Box::new(moving),
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    fn apply(&mut self, tx: &mut Transaction<'_>, target: &Vector2) -> Result<()> {
        let d = target - self.pivot;
        let len = d.norm();
        if len < self.distance * self.guard_ratio || len < EPSILON {
            return Ok(());
        }
        let position = self.pivot + d * (self.side * self.distance / len);
        self.moving.apply(tx, &position)
    }
}

/// 固定圆心拖拽：圆上点沿圆心出发的固定射线移动
#[derive(Debug, Clone, PartialEq)]
pub struct FixedCenterDrag {
    center: Vector2,
    direction: Vector2,
    moving: Box<Dragger>,
}

impl FixedCenterDrag {
    pub fn new(center: Vector2, edge: Vector2, grab: Vector2, moving: Dragger) -> Self {
        let mut direction = edge - center;
        if direction.norm() < EPSILON {
            direction = grab - center;
        }
        let direction = if direction.norm() < EPSILON {
            Vector2::new(1.0, 0.0)
        } else {
            direction.normalize()
        };
        Self {
            center,
            direction,
            moving: Box::new(moving),
        }
    }

    fn apply(&mut self, tx: &mut Transaction<'_>, target: &Vector2) -> Result<()> {
        let radius = (target - self.center).norm();
        let edge = self.center + self.direction * radius;
        self.moving.apply(tx, &edge)
    }
}

/// 固定圆上点拖拽：圆心 = 中点(圆上点, 目标) + 偏离比例 × perp(目标 - 圆上点)
#[derive(Debug, Clone, PartialEq)]
pub struct FixedEdgeDrag {
    edge: Vector2,
    deviation: f64,
    moving: Box<Dragger>,
}

impl FixedEdgeDrag {
    pub fn new(edge: Vector2, center: Vector2, grab: Vector2, moving: Dragger) -> Self {
        let chord = grab - edge;
        let len_sq = chord.norm_squared();
        // 圆心在弦垂直方向上的有符号偏离，保持圆弧的手性
        let deviation = if len_sq < EPSILON {
            0.0
        } else {
            (center - edge).dot(&perp(&chord)) / len_sq
        };
        Self {
            edge,
            deviation,
            moving: Box::new(moving),
        }
    }

    pub fn deviation(&self) -> f64 {
        self.deviation
    }

    fn apply(&mut self, tx: &mut Transaction<'_>, target: &Vector2) -> Result<()> {
        let chord = target - self.edge;
        let center = midpoint(&self.edge, target) + perp(&chord) * self.deviation;
        self.moving.apply(tx, &center)
    }
}

/// 两点曲线的端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    First,
    Second,
}

/// 两点曲线（直线、圆）共用的拖拽分派
pub trait TwoPointDrag {
    /// 一端固定、另一端可拖拽时的曲线专属拖拽器
    fn anchored(
        &self,
        registry: &Registry,
        anchor: Endpoint,
        anchor_id: PrimitiveId,
        moving_id: PrimitiveId,
        grab: &Vector2,
    ) -> Result<Dragger>;

    fn try_drag(&self, registry: &Registry, curve: PrimitiveId, grab: &Vector2) -> Result<Dragger> {
        let &[first, second] = registry.get(curve)?.parents() else {
            return Err(CoreError::NotImplemented("two-point drag without two endpoints"));
        };
        let first_drag = registry.try_drag(first, grab)?;
        let second_drag = registry.try_drag(second, grab)?;

        match (first_drag.can_drag(), second_drag.can_drag()) {
            (true, true) => Ok(Dragger::Compound(CompoundDrag::new(vec![
                first_drag,
                second_drag,
            ]))),
            (true, false) => {
                self.anchor_or_block(registry, curve, Endpoint::Second, second, first, grab)
            }
            (false, true) => {
                self.anchor_or_block(registry, curve, Endpoint::First, first, second, grab)
            }
            (false, false) => Ok(Dragger::Fixed(FixedDrag::new(vec![first, second], *grab))),
        }
    }

    /// 固定端依赖被拖端时拖拽会形成矛盾的影响环，拒绝拖拽
    fn anchor_or_block(
        &self,
        registry: &Registry,
        curve: PrimitiveId,
        anchor: Endpoint,
        anchor_id: PrimitiveId,
        moving_id: PrimitiveId,
        grab: &Vector2,
    ) -> Result<Dragger> {
        if registry.depends_on(anchor_id, moving_id)? {
            return Ok(Dragger::Fixed(FixedDrag::new(vec![anchor_id, curve], *grab)));
        }
        self.anchored(registry, anchor, anchor_id, moving_id, grab)
    }
}

/// 直线：绕固定端点旋转
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDrag;

impl TwoPointDrag for LineDrag {
    fn anchored(
        &self,
        registry: &Registry,
        _anchor: Endpoint,
        anchor_id: PrimitiveId,
        moving_id: PrimitiveId,
        grab: &Vector2,
    ) -> Result<Dragger> {
        let pivot = registry.get(anchor_id)?.require_point()?;
        let original = registry.get(moving_id)?.require_point()?;
        let moving = registry.try_drag(moving_id, &original)?;
        Ok(Dragger::Pivot(PivotDrag::new(
            pivot,
            original,
            *grab,
            registry.config().pivot_guard_ratio,
            moving,
        )))
    }
}

/// 圆：固定圆心改半径，或固定圆上点移动圆心
#[derive(Debug, Clone, Copy, Default)]
pub struct CircleDrag;

impl TwoPointDrag for CircleDrag {
    fn anchored(
        &self,
        registry: &Registry,
        anchor: Endpoint,
        anchor_id: PrimitiveId,
        moving_id: PrimitiveId,
        grab: &Vector2,
    ) -> Result<Dragger> {
        let fixed = registry.get(anchor_id)?.require_point()?;
        let original = registry.get(moving_id)?.require_point()?;
        let moving = registry.try_drag(moving_id, &original)?;
        Ok(match anchor {
            Endpoint::First => {
                Dragger::FixedCenter(FixedCenterDrag::new(fixed, original, *grab, moving))
            }
            Endpoint::Second => {
                Dragger::FixedEdge(FixedEdgeDrag::new(fixed, original, *grab, moving))
            }
        })
    }
}

impl Registry {
    /// 询问在 `grab` 处抓取图元 `id` 时的拖拽方式
    pub fn try_drag(&self, id: PrimitiveId, grab: &Vector2) -> Result<Dragger> {
        let primitive = self.get(id)?;
        match &primitive.kind {
            PrimitiveKind::FreePoint(point) => {
                Ok(Dragger::Free(FreeDrag::new(id, grab - point.position)))
            }
            PrimitiveKind::IntersectionPoint(_) => {
                Ok(Dragger::Fixed(FixedDrag::new(vec![id], *grab)))
            }
            PrimitiveKind::Line(_) => LineDrag.try_drag(self, id, grab),
            PrimitiveKind::Circle(_) => CircleDrag.try_drag(self, id, grab),
        }
    }
}
