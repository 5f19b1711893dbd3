//! 对话脚本：每关拉取一次，本次访问内不可变

use serde::{Deserialize, Serialize};

/// 说话方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Npc,
    Player,
}

/// 一句台词
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub speaker: Speaker,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_title: Option<String>,
    /// 这句台词揭示了钥匙词
    #[serde(default)]
    pub gives_key: bool,
}

impl Line {
    pub fn npc(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Npc,
            text: text.into(),
            character_name: None,
            character_title: None,
            gives_key: false,
        }
    }

    pub fn player(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Player,
            ..Self::npc(text)
        }
    }

    pub fn with_character(mut self, name: impl Into<String>, title: impl Into<String>) -> Self {
        self.character_name = Some(name.into());
        self.character_title = Some(title.into());
        self
    }

    pub fn revealing_key(mut self) -> Self {
        self.gives_key = true;
        self
    }

    pub fn is_player(&self) -> bool {
        self.speaker == Speaker::Player
    }
}

/// NPC 展示信息：取第一句 NPC 台词上的名字与头衔
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NpcMeta {
    pub name: String,
    pub title: String,
}

impl Default for NpcMeta {
    fn default() -> Self {
        Self {
            name: "Guide".to_string(),
            title: String::new(),
        }
    }
}

/// 对话脚本
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DialogueScript {
    lines: Vec<Line>,
    npc: NpcMeta,
}

impl DialogueScript {
    pub fn new(lines: Vec<Line>) -> Self {
        let npc = lines
            .iter()
            .find(|l| l.speaker == Speaker::Npc)
            .map(|l| NpcMeta {
                name: l
                    .character_name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| NpcMeta::default().name),
                title: l.character_title.clone().unwrap_or_default(),
            })
            .unwrap_or_default();
        Self { lines, npc }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn get(&self, index: usize) -> Option<&Line> {
        self.lines.get(index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_last(&self, index: usize) -> bool {
        index + 1 >= self.lines.len()
    }

    pub fn npc(&self) -> &NpcMeta {
        &self.npc
    }

    /// 当前行的说话人标签：玩家为 "You"，否则为 NPC 名
    pub fn speaker_label(&self, line: &Line) -> String {
        if line.is_player() {
            "You".to_string()
        } else {
            self.npc.name.clone()
        }
    }
}
