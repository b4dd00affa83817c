//! 数学基础类型
//!
//! 基于 nalgebra 的二维向量别名和少量辅助函数。

/// 二维向量（位置与方向共用）
pub type Vector2 = nalgebra::Vector2<f64>;

/// 数值比较容差
pub const EPSILON: f64 = 1e-10;

/// 构造二维向量
#[inline]
pub fn vec2(x: f64, y: f64) -> Vector2 {
    Vector2::new(x, y)
}

/// 从 `from` 指向 `to` 的向量
#[inline]
pub fn span(from: &Vector2, to: &Vector2) -> Vector2 {
    to - from
}

/// 两点中点
#[inline]
pub fn midpoint(a: &Vector2, b: &Vector2) -> Vector2 {
    (a + b) * 0.5
}

/// 逆时针旋转 90°
#[inline]
pub fn perp(v: &Vector2) -> Vector2 {
    Vector2::new(-v.y, v.x)
}

/// 绕原点旋转指定角度（弧度）
pub fn rotate(v: &Vector2, angle: f64) -> Vector2 {
    let (sin, cos) = angle.sin_cos();
    Vector2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// 二维叉积（z 分量）
#[inline]
pub fn cross(a: &Vector2, b: &Vector2) -> f64 {
    a.x * b.y - a.y * b.x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perp_is_ccw_rotation() {
        let v = vec2(1.0, 0.0);
        let p = perp(&v);
        let r = rotate(&v, std::f64::consts::FRAC_PI_2);
        assert!((p - r).norm() < 1e-12);
        assert!(v.dot(&p).abs() < EPSILON);
        assert!(cross(&v, &p) > 0.0);
    }

    #[test]
    fn test_span_and_midpoint() {
        let a = vec2(1.0, 2.0);
        let b = vec2(5.0, -2.0);
        assert_eq!(span(&a, &b), vec2(4.0, -4.0));
        assert_eq!(midpoint(&a, &b), vec2(3.0, 0.0));
    }
}
