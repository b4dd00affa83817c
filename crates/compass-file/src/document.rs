//! 构造快照
//!
//! 快照只保存图元记录，恢复时通过注册表的公开创建接口逐条重放：
//! 派生几何由约束重算，交点按保存的提示选回原来的分支。

use crate::error::FileError;
use chrono::{DateTime, Utc};
use compass_core::primitive::PrimitiveId;
use compass_core::record::{PrimitiveRecord, RecordData};
use compass_core::{CoreConfig, ExpectationFailure, Registry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 当前快照版本
pub const SNAPSHOT_VERSION: u32 = 1;

/// 快照元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub name: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl SnapshotMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            created: now,
            modified: now,
        }
    }
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// 构造快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub metadata: SnapshotMetadata,
    /// 按 (层级, ID) 升序，父图元总在子图元之前
    pub primitives: Vec<PrimitiveRecord>,
}

impl Snapshot {
    /// 记录注册表当前的所有存活图元
    pub fn capture(registry: &Registry, metadata: SnapshotMetadata) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            metadata,
            primitives: registry.records(),
        }
    }

    /// 用新内容覆盖快照，保留创建时间
    pub fn update(&mut self, registry: &Registry) {
        self.primitives = registry.records();
        self.metadata.modified = Utc::now();
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// 恢复为新的注册表（默认配置）
    pub fn restore(&self) -> Result<Registry, FileError> {
        self.restore_with_config(CoreConfig::default())
    }

    /// 恢复为新的注册表
    ///
    /// 保存的ID只用于解析父图元引用，新注册表重新分配ID。
    pub fn restore_with_config(&self, config: CoreConfig) -> Result<Registry, FileError> {
        let mut registry = Registry::with_config(config);
        let mut ids: HashMap<PrimitiveId, PrimitiveId> =
            HashMap::with_capacity(self.primitives.len());
        let mut hidden = Vec::new();

        for record in &self.primitives {
            if ids.contains_key(&record.id) {
                return Err(FileError::Corruption(format!("duplicate primitive id {}", record.id)));
            }
            let parents = resolve_parents(&ids, record)?;
            let id = restore_record(&mut registry, record, &parents)?;
            ids.insert(record.id, id);
            if !record.selectable {
                hidden.push(id);
            }
        }

        // 每个图元单独一个事务：同一事务里先改祖先会使后代失效
        for id in hidden {
            registry.edit(|tx| tx.set_selectable(id, false))?;
        }

        tracing::debug!(
            name = %self.metadata.name,
            primitives = registry.len(),
            "snapshot restored"
        );
        Ok(registry)
    }

    /// 序列化为 JSON 文本
    pub fn to_json(&self) -> Result<String, FileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 从 JSON 文本解析
    pub fn from_json(text: &str) -> Result<Self, FileError> {
        let snapshot: Snapshot = serde_json::from_str(text)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub(crate) fn check_version(&self) -> Result<(), FileError> {
        if self.version > SNAPSHOT_VERSION {
            return Err(FileError::UnsupportedVersion(format!(
                "Snapshot version {} is newer than supported version {}",
                self.version, SNAPSHOT_VERSION
            )));
        }
        Ok(())
    }
}

fn resolve_parents(
    ids: &HashMap<PrimitiveId, PrimitiveId>,
    record: &PrimitiveRecord,
) -> Result<Vec<PrimitiveId>, FileError> {
    let expected = match record.data {
        RecordData::FreePoint { .. } => 0,
        RecordData::IntersectionPoint { .. } | RecordData::Line | RecordData::Circle => 2,
    };
    if record.parents.len() != expected {
        return Err(FileError::Corruption(format!(
            "{} {} has {} parents, expected {}",
            record.tag().name(),
            record.id,
            record.parents.len(),
            expected
        )));
    }
    record
        .parents
        .iter()
        .map(|parent| ids.get(parent).copied().ok_or(FileError::UnknownReference(*parent)))
        .collect()
}

fn restore_record(
    registry: &mut Registry,
    record: &PrimitiveRecord,
    parents: &[PrimitiveId],
) -> Result<PrimitiveId, FileError> {
    let id = match (&record.data, parents) {
        (RecordData::FreePoint { position }, []) => registry.create_point(*position)?,
        (RecordData::Line, &[p0, p1]) => registry.create_line(p0, p1)?,
        (RecordData::Circle, &[center, edge]) => registry.create_circle(center, edge)?,
        (
            RecordData::IntersectionPoint {
                position,
                hints,
                invalid,
            },
            &[a, b],
        ) => {
            let lookup = registry.try_get_or_create_intersection_point(
                a,
                b,
                *position,
                Some(hints.clone()),
                *invalid,
            )?;
            match lookup {
                Some(lookup) if lookup.is_existing => {
                    return Err(FileError::Corruption(format!(
                        "intersection point {} duplicates an earlier point",
                        record.id
                    )));
                }
                Some(lookup) => lookup.id,
                None => return Err(ExpectationFailure::MissingIntersection { a, b }.into()),
            }
        }
        _ => {
            return Err(FileError::Corruption(format!(
                "malformed {} record {}",
                record.tag().name(),
                record.id
            )))
        }
    };
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compass_core::math::vec2;
    use compass_core::primitive::PrimitiveTag;
    use compass_core::CoreError;

    /// 两个半径 5 的圆，圆心相距 6，交点取下方分支
    fn two_circles() -> (Registry, [PrimitiveId; 4], PrimitiveId) {
        let mut registry = Registry::new();
        let c0 = registry.create_point(vec2(0.0, 0.0)).unwrap();
        let e0 = registry.create_point(vec2(5.0, 0.0)).unwrap();
        let c1 = registry.create_point(vec2(6.0, 0.0)).unwrap();
        let e1 = registry.create_point(vec2(11.0, 0.0)).unwrap();
        let k0 = registry.create_circle(c0, e0).unwrap();
        let k1 = registry.create_circle(c1, e1).unwrap();
        let x = registry
            .try_get_or_create_intersection_point(k0, k1, vec2(3.0, -3.0), None, false)
            .unwrap()
            .unwrap()
            .id;
        (registry, [c0, e0, c1, e1], x)
    }

    fn find(registry: &Registry, tag: PrimitiveTag) -> Vec<PrimitiveId> {
        registry.iter().filter(|p| p.tag() == tag).map(|p| p.id()).collect()
    }

    #[test]
    fn test_json_restore_keeps_graph() {
        let (registry, _, _) = two_circles();
        let snapshot = Snapshot::capture(&registry, SnapshotMetadata::new("circles"));
        let text = snapshot.to_json().unwrap();

        let parsed = Snapshot::from_json(&text).unwrap();
        assert_eq!(parsed, snapshot);

        let restored = parsed.restore().unwrap();
        assert_eq!(restored.len(), registry.len());
        let x = find(&restored, PrimitiveTag::IntersectionPoint)[0];
        let p = restored.get(x).unwrap().position().unwrap();
        assert!((p - vec2(3.0, -4.0)).norm() < 1e-9);
        assert_eq!(restored.records(), registry.records());
    }

    #[test]
    fn test_invalid_intersection_restores_branch() {
        let (mut registry, [_, _, c1, e1], _) = two_circles();
        registry
            .edit(|tx| {
                tx.set_position(c1, vec2(20.0, 0.0))?;
                tx.set_position(e1, vec2(25.0, 0.0))
            })
            .unwrap();

        let snapshot = Snapshot::capture(&registry, SnapshotMetadata::default());
        let mut restored = Snapshot::from_json(&snapshot.to_json().unwrap())
            .unwrap()
            .restore()
            .unwrap();
        let x = find(&restored, PrimitiveTag::IntersectionPoint)[0];
        assert!(restored.get(x).unwrap().is_invalid());

        // 圆心移回后沿用保存的下方分支
        let c1 = restored.pick(&vec2(20.0, 0.0), Some(0.1)).unwrap();
        let e1 = restored.pick(&vec2(25.0, 0.0), Some(0.1)).unwrap();
        restored
            .edit(|tx| {
                tx.set_position(c1, vec2(6.0, 0.0))?;
                tx.set_position(e1, vec2(11.0, 0.0))
            })
            .unwrap();
        let p = restored.get(x).unwrap().position().unwrap();
        assert!((p - vec2(3.0, -4.0)).norm() < 1e-9);
    }

    #[test]
    fn test_selectable_flag_restored() {
        let (mut registry, [c0, ..], x) = two_circles();
        registry.edit(|tx| tx.set_selectable(c0, false)).unwrap();
        registry.edit(|tx| tx.set_selectable(x, false)).unwrap();

        let restored = Snapshot::capture(&registry, SnapshotMetadata::default())
            .restore()
            .unwrap();
        let hidden: Vec<_> = restored
            .iter()
            .filter(|p| !p.is_selectable())
            .map(|p| p.tag())
            .collect();
        assert_eq!(hidden, vec![PrimitiveTag::FreePoint, PrimitiveTag::IntersectionPoint]);
    }

    #[test]
    fn test_duplicate_intersection_is_corruption() {
        let (registry, _, x) = two_circles();
        let mut snapshot = Snapshot::capture(&registry, SnapshotMetadata::default());
        let mut copy = snapshot.primitives.iter().find(|r| r.id == x).unwrap().clone();
        copy.id = PrimitiveId(100);
        snapshot.primitives.push(copy);

        assert!(matches!(snapshot.restore(), Err(FileError::Corruption(_))));
    }

    #[test]
    fn test_unknown_parent_reference() {
        let (registry, _, _) = two_circles();
        let mut snapshot = Snapshot::capture(&registry, SnapshotMetadata::default());
        // 去掉第一个自由点，引用它的圆无法解析
        let removed = snapshot.primitives.remove(0).id;

        match snapshot.restore() {
            Err(FileError::UnknownReference(id)) => assert_eq!(id, removed),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_stale_valid_flag_is_expectation_failure() {
        let (mut registry, [_, _, c1, e1], x) = two_circles();
        registry
            .edit(|tx| {
                tx.set_position(c1, vec2(20.0, 0.0))?;
                tx.set_position(e1, vec2(25.0, 0.0))
            })
            .unwrap();
        let mut snapshot = Snapshot::capture(&registry, SnapshotMetadata::default());
        for record in snapshot.primitives.iter_mut().filter(|r| r.id == x) {
            if let RecordData::IntersectionPoint { invalid, .. } = &mut record.data {
                *invalid = false;
            }
        }

        assert!(matches!(
            snapshot.restore(),
            Err(FileError::Core(CoreError::Expectation(
                ExpectationFailure::MissingIntersection { .. }
            )))
        ));
    }

    #[test]
    fn test_branch_kept_when_restore_renumbers_curves() {
        let mut registry = Registry::new();
        let c0 = registry.create_point(vec2(0.0, 0.0)).unwrap();
        let e0 = registry.create_point(vec2(5.0, 0.0)).unwrap();
        let c1 = registry.create_point(vec2(6.0, 0.0)).unwrap();
        let e1 = registry.create_point(vec2(11.0, 0.0)).unwrap();
        let spare = registry.create_point(vec2(20.0, 20.0)).unwrap();
        let k0 = registry.create_circle(c0, e0).unwrap();
        let k1 = registry.create_circle(c1, e1).unwrap();
        let top = registry
            .try_get_or_create_intersection_point(k0, k1, vec2(3.0, 4.0), None, false)
            .unwrap()
            .unwrap()
            .id;
        registry.dispose(&[spare]).unwrap();

        // 复用较小的ID：高层级的圆ID小于低层级的 k0，恢复后顺序反转
        let k2 = registry.create_circle(top, c0).unwrap();
        assert!(k2 < k0);
        let y = registry
            .try_get_or_create_intersection_point(k2, k0, vec2(5.0, -0.6), None, false)
            .unwrap()
            .unwrap()
            .id;
        let expected = registry.get(y).unwrap().position().unwrap();

        let restored = Snapshot::capture(&registry, SnapshotMetadata::default())
            .restore()
            .unwrap();
        let y = restored.pick(&expected, Some(0.1)).unwrap();
        let p = restored.get(y).unwrap().position().unwrap();
        assert_eq!(restored.get(y).unwrap().tag(), PrimitiveTag::IntersectionPoint);
        assert!((p - expected).norm() < 1e-9);

        let saved = registry.records().into_iter().map(|r| r.data);
        assert!(saved.eq(restored.records().into_iter().map(|r| r.data)));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut snapshot = Snapshot::capture(&Registry::new(), SnapshotMetadata::default());
        snapshot.version = SNAPSHOT_VERSION + 1;
        let text = serde_json::to_string(&snapshot).unwrap();
        assert!(matches!(Snapshot::from_json(&text), Err(FileError::UnsupportedVersion(_))));
    }
}
