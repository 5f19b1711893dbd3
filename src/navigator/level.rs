//! 关卡：一旦加载即不可变，按 order_index 排列成牌组

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 关卡 ID（后端分配）
pub type LevelId = i64;

/// 关卡列表契约返回的单条记录
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub id: LevelId,
    pub level_number: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// 牌组中的关卡
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Level {
    pub id: LevelId,
    /// 决定牌组位置，同时也是解锁判断用的关卡序号
    pub order_index: u32,
    pub title: String,
    pub description: String,
    /// 插图引用；映射表里没有时为空，按无图渲染
    pub image_ref: Option<String>,
}

impl Level {
    pub fn from_summary(summary: LevelSummary, images: &HashMap<u32, String>) -> Self {
        let image_ref = images.get(&summary.level_number).cloned();
        Self {
            id: summary.id,
            order_index: summary.level_number,
            title: summary.title,
            description: summary.description,
            image_ref,
        }
    }
}

/// 为关卡列表挂上插图引用并按 order_index 排序
pub fn build_deck(summaries: Vec<LevelSummary>, images: &HashMap<u32, String>) -> Vec<Level> {
    let mut deck: Vec<Level> = summaries
        .into_iter()
        .map(|s| Level::from_summary(s, images))
        .collect();
    deck.sort_by_key(|l| l.order_index);
    deck
}
