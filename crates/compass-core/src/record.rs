//! 图元记录
//!
//! 序列化协作方与核心之间唯一的数据契约：每个存活图元的
//! (ID, 类型标记, 父图元ID, 类型专属字段)。派生几何不记录，恢复时由约束重算。

use crate::math::Vector2;
use crate::primitive::{Hints, PrimitiveId, PrimitiveKind, PrimitiveTag};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};

/// 单个图元的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveRecord {
    pub id: PrimitiveId,
    pub parents: Vec<PrimitiveId>,
    pub selectable: bool,
    pub data: RecordData,
}

/// 类型专属字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordData {
    FreePoint {
        position: Vector2,
    },
    IntersectionPoint {
        /// 最近一次求解的位置，恢复时作为近似位置
        position: Vector2,
        hints: Hints,
        invalid: bool,
    },
    Line,
    Circle,
}

impl RecordData {
    pub fn tag(&self) -> PrimitiveTag {
        match self {
            RecordData::FreePoint { .. } => PrimitiveTag::FreePoint,
            RecordData::IntersectionPoint { .. } => PrimitiveTag::IntersectionPoint,
            RecordData::Line => PrimitiveTag::Line,
            RecordData::Circle => PrimitiveTag::Circle,
        }
    }
}

impl PrimitiveRecord {
    pub fn tag(&self) -> PrimitiveTag {
        self.data.tag()
    }
}

impl Registry {
    /// 所有存活图元的记录，按 (层级, ID) 升序，父图元总在子图元之前
    pub fn records(&self) -> Vec<PrimitiveRecord> {
        let mut primitives: Vec<_> = self.iter().collect();
        primitives.sort_by_key(|p| (p.level(), p.id()));

        primitives
            .into_iter()
            .map(|p| {
                let data = match p.kind() {
                    PrimitiveKind::FreePoint(point) => RecordData::FreePoint {
                        position: point.position,
                    },
                    PrimitiveKind::IntersectionPoint(point) => RecordData::IntersectionPoint {
                        position: point.position,
                        hints: point.hints.clone(),
                        invalid: p.is_invalid(),
                    },
                    PrimitiveKind::Line(_) => RecordData::Line,
                    PrimitiveKind::Circle(_) => RecordData::Circle,
                };
                PrimitiveRecord {
                    id: p.id(),
                    parents: p.parents().to_vec(),
                    selectable: p.is_selectable(),
                    data,
                }
            })
            .collect()
    }
}
