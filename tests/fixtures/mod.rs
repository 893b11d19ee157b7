//! Test fixtures and stub implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use score_ranker::config::AppConfig;
use score_ranker::inference::{
    CancelToken, InferenceEngine, InferenceError, InferenceRequest, RunMode, SkillEstimate,
};
use score_ranker::types::{Gamemode, Modifier, ModifierSet, PlayerId, ScoreEvent, SubjectId};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Engine stub answering every request with fixed raw skills
///
/// Skills are given in dense player order. Sampling requests receive
/// `draws` identical copies.
#[derive(Debug)]
pub struct StubEngine {
    skills: Vec<f64>,
    draws: usize,
    calls: AtomicUsize,
}

impl StubEngine {
    pub fn new(skills: Vec<f64>) -> Self {
        Self {
            skills,
            draws: 4,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of estimate calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn estimate(
        &self,
        request: Arc<InferenceRequest>,
        mode: RunMode,
        _cancel: CancelToken,
    ) -> Result<SkillEstimate, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.players != self.skills.len() {
            return Err(InferenceError::Backend {
                message: format!(
                    "stub holds {} skills for {} players",
                    self.skills.len(),
                    request.players
                ),
            });
        }
        Ok(match mode {
            RunMode::PointEstimate => SkillEstimate::point(self.skills.clone()),
            RunMode::Sampling => SkillEstimate::sampled(vec![self.skills.clone(); self.draws]),
        })
    }
}

/// Score event with modifiers given by acronym
pub fn event(player: PlayerId, subject: SubjectId, mods: &[&str], score: f64) -> ScoreEvent {
    ScoreEvent::new(
        player,
        subject,
        ModifierSet::new(mods.iter().map(|m| Modifier::new(*m)).collect()),
        score,
    )
}

/// Write `{gamemode}.json` and `{gamemode}_users.csv` into `dir`
pub fn write_inputs(dir: &Path, gamemode: Gamemode, events: &[ScoreEvent], users: &[(PlayerId, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join(format!("{gamemode}.json")),
        serde_json::to_string(events).unwrap(),
    )
    .unwrap();

    let rows: String = users
        .iter()
        .map(|(id, name)| format!("{id},'{name}'\n"))
        .collect();
    std::fs::write(dir.join(format!("{gamemode}_users.csv")), rows).unwrap();
}

/// Configuration reading from and writing to `root`, point-estimate mode
pub fn test_config(root: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.pipeline.input_dir = root.join("input");
    config.pipeline.output_dir = root.join("output");
    config.pipeline.draws_dir = root.join("draws");
    config.pipeline.fast = true;
    config.inference.threads = 2;
    config.inference.draws = 40;
    config.inference.warmup = 40;
    config
}

/// Leaderboard lines of `gamemode` under the configured output dir
pub fn read_leaderboard(config: &AppConfig, gamemode: Gamemode) -> Vec<String> {
    let path = config
        .pipeline
        .output_dir
        .join(format!("{gamemode}_ranking.txt"));
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Split a leaderboard line into `(raw_id, skill_score, rank_metric, username)`
pub fn parse_line(line: &str) -> (PlayerId, f64, f64, String) {
    let mut fields = line.splitn(4, ',');
    let raw_id = fields.next().unwrap().parse().unwrap();
    let skill_score = fields.next().unwrap().parse().unwrap();
    let rank_metric = fields.next().unwrap().parse().unwrap();
    let username = fields.next().unwrap().to_string();
    (raw_id, skill_score, rank_metric, username)
}
