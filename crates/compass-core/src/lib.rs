//! Compass 构造图核心
//!
//! 尺规作图的交互式几何构造引擎：图元依赖图、事务式失效与重算、交点去重与分支提示、拖拽协议。
//!
//! # 架构设计
//!
//! - `Registry`: 唯一拥有所有图元，分配ID，缓存交点
//! - `Primitive`: 图元节点（自由点、交点、直线、圆），子图元以ID反向引用
//! - `Transaction`: 唯一的修改入口，结束时按层级重算失效图元
//! - `Dragger`: 一次抓取手势的拖拽策略
//!
//! # 示例
//!
//! ```rust
//! use compass_core::prelude::*;
//!
//! let mut registry = Registry::new();
//! let a = registry.create_point(vec2(0.0, 0.0))?;
//! let b = registry.create_point(vec2(1.0, 0.0))?;
//! let line = registry.create_line(a, b)?;
//!
//! registry.edit(|tx| tx.set_position(b, vec2(0.0, 2.0)))?;
//! assert!(registry.get(line)?.curve().is_some());
//! # Ok::<(), compass_core::CoreError>(())
//! ```

pub mod config;
pub mod drag;
pub mod error;
pub mod geometry;
pub mod intersection;
pub mod math;
pub mod primitive;
pub mod record;
pub mod registry;
pub mod transaction;

pub use config::CoreConfig;
pub use error::{CoreError, ExpectationFailure, ProtocolViolation, Result};
pub use registry::Registry;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::config::CoreConfig;
    pub use crate::drag::{CircleDrag, Dragger, Endpoint, LineDrag, TwoPointDrag};
    pub use crate::error::{CoreError, ExpectationFailure, ProtocolViolation, Result};
    pub use crate::geometry::{CircleGeometry, CurveGeometry, LineGeometry};
    pub use crate::math::{vec2, Vector2, EPSILON};
    pub use crate::primitive::{Hints, Primitive, PrimitiveId, PrimitiveKind, PrimitiveTag};
    pub use crate::record::{PrimitiveRecord, RecordData};
    pub use crate::registry::{IntersectionLookup, ListenerId, PairKey, Registry};
    pub use crate::transaction::{Phase, Transaction};
}
