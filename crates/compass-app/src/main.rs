//! Compass 命令行演示程序
//!
//! 用尺规作出线段的中垂线，拖动端点验证约束随之更新，最后保存并重新加载快照。
//!
//! 用法：`compass [config.json]`

mod config;

use anyhow::{Context, Result};
use compass_core::prelude::*;
use compass_file::{native, Snapshot, SnapshotMetadata};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::AppConfig;

/// 中垂线作图中需要观察的图元
struct Bisector {
    a: PrimitiveId,
    b: PrimitiveId,
    segment: PrimitiveId,
    bisector: PrimitiveId,
    midpoint: PrimitiveId,
}

/// 以 A、B 为圆心作两圆，过两交点作直线，再与 AB 求交得到中点
fn build(registry: &mut Registry) -> Result<Bisector> {
    let a = registry.create_point(vec2(0.0, 0.0))?;
    let b = registry.create_point(vec2(4.0, 0.0))?;
    let around_a = registry.create_circle(a, b)?;
    let around_b = registry.create_circle(b, a)?;

    let upper = intersect(registry, around_a, around_b, vec2(2.0, 3.0))?;
    let lower = intersect(registry, around_a, around_b, vec2(2.0, -3.0))?;
    let bisector = registry.create_line(upper, lower)?;
    let segment = registry.create_line(a, b)?;
    let midpoint = intersect(registry, bisector, segment, vec2(2.0, 0.0))?;

    Ok(Bisector {
        a,
        b,
        segment,
        bisector,
        midpoint,
    })
}

fn intersect(
    registry: &mut Registry,
    p: PrimitiveId,
    q: PrimitiveId,
    near: Vector2,
) -> Result<PrimitiveId> {
    let lookup = registry
        .try_get_or_create_intersection_point(p, q, near, None, false)?
        .with_context(|| format!("{p} and {q} do not intersect"))?;
    Ok(lookup.id)
}

fn position(registry: &Registry, id: PrimitiveId) -> Result<Vector2> {
    registry
        .get(id)?
        .position()
        .with_context(|| format!("{id} is not a point"))
}

/// 拖动端点 B，检查中点始终位于 AB 中间
fn drag_endpoint(registry: &mut Registry, bisector: &Bisector) -> Result<()> {
    let grab = position(registry, bisector.b)?;
    let mut dragger = registry.try_drag(bisector.b, &grab)?;

    for step in 1..=8 {
        let t = f64::from(step) / 8.0;
        dragger.drag_to(registry, grab + vec2(2.0 * t, 3.0 * t))?;

        let a = position(registry, bisector.a)?;
        let b = position(registry, bisector.b)?;
        let m = position(registry, bisector.midpoint)?;
        let error = (m - compass_core::math::midpoint(&a, &b)).norm();
        info!(step, x = m.x, y = m.y, error, "midpoint follows drag");
        if error > 1e-9 {
            warn!(step, error, "midpoint drifted");
        }
    }
    Ok(())
}

fn report_drag(registry: &Registry, name: &str, id: PrimitiveId, grab: Vector2) -> Result<()> {
    let dragger = registry.try_drag(id, &grab)?;
    if dragger.can_drag() {
        info!("{} can be dragged", name);
    } else {
        let offenses: Vec<String> = dragger.offenses().iter().map(ToString::to_string).collect();
        info!("{} is fixed by {}", name, offenses.join(", "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(Path::new(&path))?,
        None => AppConfig::default(),
    };

    // 初始化日志
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(config.level()?).finish()
    )?;

    info!("Starting Compass...");

    let mut registry = Registry::with_config(config.core.clone());
    let bisector = build(&mut registry)?;
    info!(primitives = registry.len(), "construction built");

    drag_endpoint(&mut registry, &bisector)?;
    let grab = registry
        .get(bisector.bisector)?
        .closest_point(&position(&registry, bisector.midpoint)?);
    report_drag(&registry, "bisector", bisector.bisector, grab)?;
    report_drag(&registry, "segment", bisector.segment, position(&registry, bisector.a)?)?;

    let snapshot = Snapshot::capture(&registry, SnapshotMetadata::new("perpendicular bisector"));

    std::fs::create_dir_all(&config.output)
        .with_context(|| format!("Failed to create {}", config.output.display()))?;
    let json_path = config.output.join("bisector.json");
    std::fs::write(&json_path, snapshot.to_json()?)?;
    info!("Wrote {}", json_path.display());

    let native_path = config.output.join("bisector.compass");
    native::save(&snapshot, &native_path)?;

    let restored = native::load(&native_path)?.restore_with_config(config.core)?;
    // 恢复时重新分配ID，只比较记录内容
    let saved = registry.records().into_iter().map(|r| r.data);
    let loaded = restored.records().into_iter().map(|r| r.data);
    if !saved.eq(loaded) {
        anyhow::bail!("restored construction differs from the saved one");
    }
    info!(primitives = restored.len(), "construction restored");

    Ok(())
}
