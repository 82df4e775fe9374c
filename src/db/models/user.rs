use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ADJECTIVES: [&str; 10] = [
    "Quick", "Calm", "Brave", "Quiet", "Bright", "Sharp", "Nimble", "Solid", "Neat", "True",
];
const ANIMALS: [&str; 10] = [
    "Fox", "Panda", "Hawk", "Otter", "Tiger", "Koala", "Lynx", "Bear", "Whale", "Wolf",
];
const AVATARS: [&str; 12] = [
    "🦊", "🐼", "🦉", "🦄", "🐯", "🦁", "🐻", "🐨", "🐳", "🐱", "🐧", "🐢",
];

pub const MAX_NAME_CHARS: usize = 40;

/// Local identity. Created on first run and only removed by a full data clear.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("Calm");
        let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Otter");
        let avatar = AVATARS.choose(&mut rng).copied().unwrap_or("🦊");
        let suffix: u32 = rng.gen_range(100..1000);

        Self {
            id: Uuid::new_v4().to_string(),
            name: format!("{adjective} {animal} {suffix}"),
            avatar: avatar.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.trim().chars().take(MAX_NAME_CHARS).collect();
    }
}
