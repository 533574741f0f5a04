/// Combat tuning shared by every player avatar.
#[derive(Debug, Clone, Copy)]
pub struct PlayerTuning {
    pub max_hp: i32,
    pub radius: f32,
    pub respawn_seconds: f32,
    pub shoot_cooldown: f32,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            max_hp: 10,
            radius: 0.5,
            respawn_seconds: 3.0,
            shoot_cooldown: 0.4,
        }
    }
}
