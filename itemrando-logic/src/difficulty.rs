use itemrando_game::Cost;

pub const EASY: Cost = 1.0;
pub const MEDIUM: Cost = 5.0;
pub const HARD: Cost = 10.0;
pub const HARDER: Cost = 25.0;
pub const HARDCORE: Cost = 50.0;
pub const MANIA: Cost = 100.0;
pub const INFINITY: Cost = f32::INFINITY;

const LEVELS: [(Cost, &str); 6] = [
    (EASY, "easy"),
    (MEDIUM, "medium"),
    (HARD, "hard"),
    (HARDER, "very hard"),
    (HARDCORE, "hardcore"),
    (MANIA, "mania"),
];

pub fn difficulty_to_text(cost: Cost) -> String {
    if cost.is_infinite() {
        return "impossible".to_string();
    }
    for (level, name) in LEVELS {
        if cost <= level {
            return name.to_string();
        }
    }
    "beyond mania".to_string()
}
