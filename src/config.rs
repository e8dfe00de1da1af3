// 该文件是 Liaowang （瞭望） 项目的一部分。
// src/config.rs - 编译期常量
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

//! 缓冲区尺寸、阈值默认值与绑定名称。
//!
//! 这些值与编译好的网络文件一一对应，修改任何一个都需要重新编译网络。

/// 批大小
pub const BATCH_SIZE: usize = 1;
/// 网络输入宽度
pub const INPUT_W: usize = 640;
/// 网络输入高度
pub const INPUT_H: usize = 640;
/// 输入通道数
pub const INPUT_CHANNELS: usize = 3;
/// 单张图像最多输出的检测框数量
pub const MAX_DETECTIONS: usize = 1000;
/// 每条原始记录的浮点数个数: cx, cy, w, h, conf, class_id
pub const RECORD_WIDTH: usize = 6;
/// 单个批槽位的输出长度，首个元素为记录数量
pub const OUTPUT_SIZE: usize = MAX_DETECTIONS * RECORD_WIDTH + 1;
/// 单个批槽位的输入长度
pub const INPUT_SIZE: usize = INPUT_CHANNELS * INPUT_H * INPUT_W;

/// 默认置信度阈值
pub const CONF_THRESH: f32 = 0.5;
/// 默认 NMS IoU 阈值
pub const NMS_THRESH: f32 = 0.45;

/// 设备编号
pub const GPU_ID: u32 = 0;

pub const INPUT_TENSOR_NAME: &str = "data";
pub const OUTPUT_TENSOR_NAME: &str = "prob";
pub const INPUT_BINDING_INDEX: usize = 0;
pub const OUTPUT_BINDING_INDEX: usize = 1;

/// 填充区域的灰度值（归一化前）
pub const PAD_VALUE: u8 = 114;
