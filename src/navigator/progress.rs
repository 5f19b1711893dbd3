//! 进度快照与派生集合
//!
//! 解锁集合与完成集合都是最新快照上的纯函数；快照整体替换，从不就地修补。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::level::LevelId;

/// 单个关卡的完成情况
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub id: LevelId,
    #[serde(default)]
    pub completed: bool,
}

/// 进度契约的响应
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub levels: Vec<LevelProgress>,
    /// 缺省按 1 处理（只解锁第一关）
    #[serde(default)]
    pub next_unlocked_level_number: Option<u32>,
}

impl ProgressSnapshot {
    /// 解锁上界：序号 1..=bound 均已解锁，缺省与 0 都按 1 处理
    pub fn unlock_bound(&self) -> u32 {
        self.next_unlocked_level_number.unwrap_or(1).max(1)
    }

    pub fn is_unlocked(&self, order_index: u32) -> bool {
        (1..=self.unlock_bound()).contains(&order_index)
    }

    /// 完成集合：标记为 completed 的关卡 ID
    pub fn completed_ids(&self) -> HashSet<LevelId> {
        self.levels
            .iter()
            .filter(|l| l.completed)
            .map(|l| l.id)
            .collect()
    }
}

/// 快照及其派生数据，总是一起构建
#[derive(Clone, Debug)]
pub(crate) struct DerivedProgress {
    pub snapshot: ProgressSnapshot,
    pub unlock_bound: u32,
    pub completed: HashSet<LevelId>,
}

impl DerivedProgress {
    pub fn is_unlocked(&self, order_index: u32) -> bool {
        (1..=self.unlock_bound).contains(&order_index)
    }
}

impl From<ProgressSnapshot> for DerivedProgress {
    fn from(snapshot: ProgressSnapshot) -> Self {
        Self {
            unlock_bound: snapshot.unlock_bound(),
            completed: snapshot.completed_ids(),
            snapshot,
        }
    }
}
