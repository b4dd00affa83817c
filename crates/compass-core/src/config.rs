//! 核心配置

use serde::{Deserialize, Serialize};

/// 构造图核心配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// 轴心拖拽阈值：目标到轴心的距离小于 `保持距离 × 该比例` 时忽略本次拖拽
    pub pivot_guard_ratio: f64,
    /// 命中测试的默认容差
    pub pick_tolerance: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pivot_guard_ratio: 1.0 / 1000.0,
            pick_tolerance: 5.0,
        }
    }
}
