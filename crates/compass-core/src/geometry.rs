//! 几何计算库
//!
//! 纯函数，无状态：
//! - 直线/圆的求交
//! - 最近点投影
//!
//! 直线均为无限长直线（由原点和方向定义）。交点候选的顺序在曲线连续运动时保持稳定：
//! - 直线-圆：按直线参数升序
//! - 圆-圆：`[p + h·perp(dir), p - h·perp(dir)]`

use crate::math::{cross, perp, Vector2, EPSILON};
use serde::{Deserialize, Serialize};

/// 直线几何（原点 + 方向，方向不要求单位长度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineGeometry {
    pub origin: Vector2,
    pub direction: Vector2,
}

impl LineGeometry {
    pub fn new(origin: Vector2, direction: Vector2) -> Self {
        Self { origin, direction }
    }

    /// 由两点构造
    pub fn through(p0: &Vector2, p1: &Vector2) -> Self {
        Self {
            origin: *p0,
            direction: p1 - p0,
        }
    }

    /// 方向是否退化（两点重合）
    pub fn is_degenerate(&self) -> bool {
        self.direction.norm_squared() < EPSILON
    }
}

/// 圆几何
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleGeometry {
    pub center: Vector2,
    pub radius: f64,
}

impl CircleGeometry {
    pub fn new(center: Vector2, radius: f64) -> Self {
        Self { center, radius }
    }

    /// 由圆心和圆上一点构造
    pub fn through(center: &Vector2, edge: &Vector2) -> Self {
        Self {
            center: *center,
            radius: (edge - center).norm(),
        }
    }
}

/// 曲线几何
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CurveGeometry {
    Line(LineGeometry),
    Circle(CircleGeometry),
}

impl CurveGeometry {
    /// 与另一条曲线的全部交点（有序）
    pub fn intersections(&self, other: &CurveGeometry) -> Vec<Vector2> {
        match (self, other) {
            (CurveGeometry::Line(a), CurveGeometry::Line(b)) => line_line_intersections(a, b),
            (CurveGeometry::Line(l), CurveGeometry::Circle(c))
            | (CurveGeometry::Circle(c), CurveGeometry::Line(l)) => {
                line_circle_intersections(l, c)
            }
            (CurveGeometry::Circle(a), CurveGeometry::Circle(b)) => {
                circle_circle_intersections(a, b)
            }
        }
    }

    /// 曲线上距离 `point` 最近的点
    pub fn closest_point(&self, point: &Vector2) -> Vector2 {
        match self {
            CurveGeometry::Line(l) => line_closest_point(l, point),
            CurveGeometry::Circle(c) => circle_closest_point(c, point),
        }
    }

    /// 曲线在 `point` 处的切向（不归一化）
    pub fn tangent_at(&self, point: &Vector2) -> Vector2 {
        match self {
            CurveGeometry::Line(l) => l.direction,
            CurveGeometry::Circle(c) => perp(&(point - c.center)),
        }
    }
}

/// 直线-直线交点（平行或退化时为空）
pub fn line_line_intersections(a: &LineGeometry, b: &LineGeometry) -> Vec<Vector2> {
    let denom = cross(&a.direction, &b.direction);
    if denom.abs() < EPSILON {
        return vec![];
    }

    let d = b.origin - a.origin;
    let t = cross(&d, &b.direction) / denom;
    vec![a.origin + a.direction * t]
}

/// 直线-圆交点，按直线参数升序
pub fn line_circle_intersections(line: &LineGeometry, circle: &CircleGeometry) -> Vec<Vector2> {
    let d = line.direction;
    let f = line.origin - circle.center;

    let a = d.dot(&d);
    if a < EPSILON {
        return vec![];
    }
    let b = 2.0 * f.dot(&d);
    let c = f.dot(&f) - circle.radius * circle.radius;

    let discriminant = b * b - 4.0 * a * c;

    if discriminant.abs() < EPSILON {
        // 相切
        let t = -b / (2.0 * a);
        return vec![line.origin + d * t];
    }
    if discriminant < 0.0 {
        return vec![];
    }

    let sqrt_disc = discriminant.sqrt();
    let t1 = (-b - sqrt_disc) / (2.0 * a);
    let t2 = (-b + sqrt_disc) / (2.0 * a);
    vec![line.origin + d * t1, line.origin + d * t2]
}

/// 圆-圆交点
pub fn circle_circle_intersections(c1: &CircleGeometry, c2: &CircleGeometry) -> Vec<Vector2> {
    let delta = c2.center - c1.center;
    let d = delta.norm();

    // 同心或不相交
    if d < EPSILON
        || d > c1.radius + c2.radius + EPSILON
        || d < (c1.radius - c2.radius).abs() - EPSILON
    {
        return vec![];
    }

    let a = (c1.radius * c1.radius - c2.radius * c2.radius + d * d) / (2.0 * d);
    let h_sq = c1.radius * c1.radius - a * a;

    let dir = delta / d;
    let p = c1.center + dir * a;

    if h_sq < EPSILON {
        // 相切
        return vec![p];
    }

    let offset = perp(&dir) * h_sq.sqrt();
    vec![p + offset, p - offset]
}

/// 无限直线上的最近点
pub fn line_closest_point(line: &LineGeometry, point: &Vector2) -> Vector2 {
    let len_sq = line.direction.norm_squared();
    if len_sq < EPSILON {
        return line.origin;
    }
    let t = (point - line.origin).dot(&line.direction) / len_sq;
    line.origin + line.direction * t
}

/// 圆周上的最近点（点位于圆心时取 +x 方向）
pub fn circle_closest_point(circle: &CircleGeometry, point: &Vector2) -> Vector2 {
    let v = point - circle.center;
    let n = v.norm();
    if n < EPSILON {
        return circle.center + Vector2::new(circle.radius, 0.0);
    }
    circle.center + v * (circle.radius / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::vec2;

    #[test]
    fn test_line_line_intersection() {
        let l1 = LineGeometry::through(&vec2(0.0, 0.0), &vec2(10.0, 10.0));
        let l2 = LineGeometry::through(&vec2(0.0, 10.0), &vec2(10.0, 0.0));

        let points = line_line_intersections(&l1, &l2);
        assert_eq!(points.len(), 1);
        assert!((points[0].x - 5.0).abs() < EPSILON);
        assert!((points[0].y - 5.0).abs() < EPSILON);
    }

    #[test]
    fn test_line_line_parallel() {
        let l1 = LineGeometry::through(&vec2(0.0, 0.0), &vec2(1.0, 0.0));
        let l2 = LineGeometry::through(&vec2(0.0, 1.0), &vec2(3.0, 1.0));
        assert!(line_line_intersections(&l1, &l2).is_empty());
    }

    #[test]
    fn test_line_circle_ordered_by_parameter() {
        let line = LineGeometry::new(vec2(-10.0, 0.0), vec2(1.0, 0.0));
        let circle = CircleGeometry::new(vec2(0.0, 0.0), 5.0);

        let points = line_circle_intersections(&line, &circle);
        assert_eq!(points.len(), 2);
        assert!((points[0] - vec2(-5.0, 0.0)).norm() < 1e-9);
        assert!((points[1] - vec2(5.0, 0.0)).norm() < 1e-9);

        // 直线在圆外
        let far = LineGeometry::new(vec2(0.0, 6.0), vec2(1.0, 0.0));
        assert!(line_circle_intersections(&far, &circle).is_empty());
    }

    #[test]
    fn test_circle_circle_intersection() {
        let c1 = CircleGeometry::new(vec2(0.0, 0.0), 5.0);
        let c2 = CircleGeometry::new(vec2(6.0, 0.0), 5.0);

        let points = circle_circle_intersections(&c1, &c2);
        assert_eq!(points.len(), 2);
        assert!((points[0] - vec2(3.0, 4.0)).norm() < 1e-9);
        assert!((points[1] - vec2(3.0, -4.0)).norm() < 1e-9);

        let concentric = CircleGeometry::new(vec2(0.0, 0.0), 2.0);
        assert!(circle_circle_intersections(&c1, &concentric).is_empty());
    }

    #[test]
    fn test_closest_points() {
        let line = LineGeometry::through(&vec2(0.0, 0.0), &vec2(10.0, 0.0));
        // 无限直线：超出端点仍然投影
        let p = line_closest_point(&line, &vec2(-5.0, 3.0));
        assert!((p - vec2(-5.0, 0.0)).norm() < EPSILON);

        let circle = CircleGeometry::new(vec2(1.0, 1.0), 2.0);
        let q = circle_closest_point(&circle, &vec2(1.0, 10.0));
        assert!((q - vec2(1.0, 3.0)).norm() < EPSILON);
    }

    #[test]
    fn test_curve_dispatch_is_symmetric_for_mixed_pairs() {
        let line = CurveGeometry::Line(LineGeometry::new(vec2(-10.0, 1.0), vec2(1.0, 0.0)));
        let circle = CurveGeometry::Circle(CircleGeometry::new(vec2(0.0, 0.0), 3.0));
        assert_eq!(line.intersections(&circle), circle.intersections(&line));
    }
}
