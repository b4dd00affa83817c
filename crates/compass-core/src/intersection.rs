//! 交点选择
//!
//! 创建交点和重新求解交点共用的选择算法：
//! 1. 求出两条曲线的全部有序候选交点
//! 2. 若提示中记录过相同候选数量，直接使用记录的索引
//! 3. 否则选择距离近似位置最近的候选
//! 4. 没有候选时结果无效
//! 5. 非提示选择且候选多于一个时，追加提示 (候选数量, 索引)

use crate::geometry::CurveGeometry;
use crate::math::Vector2;
use crate::primitive::Hints;

/// 选择结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    /// 选中的位置（无候选时为 None）
    pub position: Option<Vector2>,
    /// 选中的候选索引
    pub index: Option<usize>,
    /// 本次求解的候选数量
    pub candidate_count: usize,
    /// 是否由提示决定
    pub from_hint: bool,
}

impl Selection {
    pub fn is_valid(&self) -> bool {
        self.position.is_some()
    }

    fn none() -> Self {
        Self {
            position: None,
            index: None,
            candidate_count: 0,
            from_hint: false,
        }
    }
}

/// 在两条曲线的交点中选择一个
pub fn select_intersection(
    a: &CurveGeometry,
    b: &CurveGeometry,
    approximate: &Vector2,
    hints: &mut Hints,
) -> Selection {
    let candidates = a.intersections(b);
    select_candidate(&candidates, approximate, hints)
}

/// 在给定候选中选择
pub fn select_candidate(
    candidates: &[Vector2],
    approximate: &Vector2,
    hints: &mut Hints,
) -> Selection {
    let count = candidates.len();
    if count == 0 {
        return Selection::none();
    }

    if let Some(index) = hints.get(count).filter(|&i| i < count) {
        return Selection {
            position: Some(candidates[index]),
            index: Some(index),
            candidate_count: count,
            from_hint: true,
        };
    }

    let mut index = 0;
    let mut best = f64::INFINITY;
    for (i, candidate) in candidates.iter().enumerate() {
        let d = (candidate - approximate).norm_squared();
        if d < best {
            best = d;
            index = i;
        }
    }

    if count > 1 {
        hints.insert(count, index);
    }

    Selection {
        position: Some(candidates[index]),
        index: Some(index),
        candidate_count: count,
        from_hint: false,
    }
}
