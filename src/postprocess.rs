// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/postprocess.rs - 输出解码与非极大值抑制
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::{config::RECORD_WIDTH, preprocess::LetterboxTransform};

/// 原图坐标系下的边界框，左上角加宽高
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

/// 检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub confidence: f32,
  pub class_id: u32,
}

/// 网络输出中的一条记录，坐标仍在网络输入空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord {
  /// [cx, cy, w, h]
  pub bbox: [f32; 4],
  pub confidence: f32,
  pub class_id: u32,
}

impl RawRecord {
  pub fn corners(&self) -> [f32; 4] {
    let [cx, cy, w, h] = self.bbox;
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
  }
}

/// 解码一个批槽位：首元素为数量，最多读取 `max_records` 条
pub fn decode(slot: &[f32], max_records: usize) -> Vec<RawRecord> {
  let Some(&count) = slot.first() else {
    return Vec::new();
  };
  let advertised = if count.is_finite() && count > 0.0 {
    count as usize
  } else {
    0
  };
  let available = slot.len().saturating_sub(1) / RECORD_WIDTH;
  let count = advertised.min(max_records).min(available);

  let records: Vec<RawRecord> = slot[1..1 + count * RECORD_WIDTH]
    .chunks_exact(RECORD_WIDTH)
    .filter_map(|r| {
      let class_id = r[5];
      if !class_id.is_finite() || class_id < 0.0 {
        debug!("丢弃类别编号无效的记录: {}", class_id);
        return None;
      }
      Some(RawRecord {
        bbox: [r[0], r[1], r[2], r[3]],
        confidence: r[4],
        class_id: class_id as u32,
      })
    })
    .collect();

  debug!("解码 {} 条记录 (声明 {})", records.len(), advertised);
  records
}

/// 中心点格式两个框的交并比
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let left = (a[0] - a[2] / 2.0).max(b[0] - b[2] / 2.0);
  let right = (a[0] + a[2] / 2.0).min(b[0] + b[2] / 2.0);
  let top = (a[1] - a[3] / 2.0).max(b[1] - b[3] / 2.0);
  let bottom = (a[1] + a[3] / 2.0).min(b[1] + b[3] / 2.0);

  let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
  let union = a[2] * a[3] + b[2] * b[3] - inter;
  if union > 0.0 { inter / union } else { 0.0 }
}

/// 按类别分组的贪心 NMS。
///
/// 组内按置信度稳定降序排列（同分保持原顺序），取最高者并移除同组内
/// IoU 大于 `iou_threshold` 的框。各组按类别编号升序拼接。
pub fn nms(records: Vec<RawRecord>, iou_threshold: f32) -> Vec<RawRecord> {
  let mut groups: BTreeMap<u32, Vec<RawRecord>> = BTreeMap::new();
  for record in records {
    groups.entry(record.class_id).or_default().push(record);
  }

  let mut kept = Vec::new();
  for (_, mut group) in groups {
    group.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut suppressed = vec![false; group.len()];
    for i in 0..group.len() {
      if suppressed[i] {
        continue;
      }
      kept.push(group[i]);
      for j in (i + 1)..group.len() {
        if !suppressed[j] && iou(&group[i].bbox, &group[j].bbox) > iou_threshold {
          suppressed[j] = true;
        }
      }
    }
  }
  kept
}

/// 把网络空间的框映射回原图，并裁剪到原图范围
pub fn remap(record: &RawRecord, transform: &LetterboxTransform) -> Detection {
  let [x1, y1, x2, y2] = record.corners();
  let (w, h) = (transform.src_width as f32, transform.src_height as f32);

  let (x1, y1) = transform.to_source(x1, y1);
  let (x2, y2) = transform.to_source(x2, y2);
  let x1 = x1.clamp(0.0, w);
  let y1 = y1.clamp(0.0, h);
  let x2 = x2.clamp(0.0, w);
  let y2 = y2.clamp(0.0, h);

  Detection {
    bbox: BoundingBox {
      x: x1,
      y: y1,
      width: (x2 - x1).max(0.0),
      height: (y2 - y1).max(0.0),
    },
    confidence: record.confidence,
    class_id: record.class_id,
  }
}

/// 解码、置信度过滤、NMS、坐标映射
pub struct Postprocessor {
  pub confidence_threshold: f32,
  pub nms_threshold: f32,
  pub max_records: usize,
}

impl Postprocessor {
  pub fn filter_and_suppress(&self, slot: &[f32]) -> Vec<RawRecord> {
    let candidates: Vec<RawRecord> = decode(slot, self.max_records)
      .into_iter()
      .filter(|r| r.confidence >= self.confidence_threshold)
      .collect();
    let candidate_count = candidates.len();
    let kept = nms(candidates, self.nms_threshold);
    debug!("置信度过滤后 {} 个, NMS 后 {} 个", candidate_count, kept.len());
    kept
  }

  pub fn process(&self, slot: &[f32], transform: &LetterboxTransform) -> Vec<Detection> {
    self
      .filter_and_suppress(slot)
      .iter()
      .map(|r| remap(r, transform))
      .collect()
  }
}
