// Bayesian multiplayer skill model (TrueSkill).
//
// Each player carries a Gaussian belief `(mu, sigma)` about their skill. An
// FFA result is a ranking with optional ties between neighbours; every
// player is treated as a one-person team and the posterior comes from the
// multi-team TrueSkill factor graph in `skillratings`.
//
// The conservative scalar shown on leaderboards is `mu - 3 * sigma`.

use serde::{Deserialize, Serialize};
use skillratings::trueskill::{trueskill_multi_team, TrueSkillConfig, TrueSkillRating};
use skillratings::MultiTeamOutcome;
use statrs::function::erf::{erfc, erfc_inv};

use crate::error::EngineError;
use crate::ffa;

pub const INITIAL_MU: f64 = 25.0;
pub const INITIAL_SIGMA: f64 = 25.0 / 3.0;
pub const DRAW_PROBABILITY: f64 = 0.05;

/// Performance noise; half the prior deviation.
const BETA: f64 = INITIAL_SIGMA / 2.0;
/// Additive dynamics applied before every game.
const TAU: f64 = INITIAL_SIGMA / 100.0;

/// Belief about one player's skill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillParams {
    pub mu: f64,
    pub sigma: f64,
}

impl SkillParams {
    pub fn skill_rating(&self) -> f64 {
        self.mu - 3.0 * self.sigma
    }

    fn is_finite(&self) -> bool {
        self.mu.is_finite() && self.sigma.is_finite()
    }
}

impl Default for SkillParams {
    fn default() -> Self {
        Self {
            mu: INITIAL_MU,
            sigma: INITIAL_SIGMA,
        }
    }
}

impl From<SkillParams> for TrueSkillRating {
    fn from(p: SkillParams) -> Self {
        TrueSkillRating {
            rating: p.mu,
            uncertainty: p.sigma,
        }
    }
}

impl From<TrueSkillRating> for SkillParams {
    fn from(r: TrueSkillRating) -> Self {
        SkillParams {
            mu: r.rating,
            sigma: r.uncertainty,
        }
    }
}

/// Posterior beliefs in ranking order plus the likelihood of the observed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillUpdate {
    pub posteriors: Vec<SkillParams>,
    pub outcome_probability: f64,
}

#[derive(Debug, Clone)]
pub struct SkillModel {
    config: TrueSkillConfig,
}

impl Default for SkillModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SkillModel {
    pub fn new() -> Self {
        Self {
            config: TrueSkillConfig {
                draw_probability: DRAW_PROBABILITY,
                beta: BETA,
                default_dynamics: TAU,
            },
        }
    }

    /// Rate one FFA game. `priors` are in ranking order (best first) and
    /// `draws[i]` marks a tie between `priors[i]` and `priors[i + 1]`.
    pub fn rate(&self, priors: &[SkillParams], draws: &[bool]) -> Result<SkillUpdate, EngineError> {
        Self::check_shape(priors.len(), draws.len())?;

        let teams: Vec<[TrueSkillRating; 1]> = priors.iter().map(|p| [(*p).into()]).collect();
        let teams_and_ranks: Vec<(&[TrueSkillRating], MultiTeamOutcome)> = teams
            .iter()
            .zip(ffa::ranks(draws))
            .map(|(team, rank)| (&team[..], MultiTeamOutcome::new(rank)))
            .collect();

        let posteriors: Vec<SkillParams> = trueskill_multi_team(&teams_and_ranks, &self.config)
            .into_iter()
            .filter_map(|team| team.first().copied().map(SkillParams::from))
            .collect();

        if posteriors.len() != priors.len() || !posteriors.iter().all(SkillParams::is_finite) {
            return Err(EngineError::InvalidInput(
                "skill update produced a non-finite posterior".to_string(),
            ));
        }

        Ok(SkillUpdate {
            outcome_probability: self.outcome_probability(priors, draws)?,
            posteriors,
        })
    }

    /// Approximate probability of the observed ranking under the priors: the
    /// product of the win/draw probabilities of adjacent pairs, treated as
    /// independent. This is not the evidence of the full factor graph.
    pub fn outcome_probability(&self, priors: &[SkillParams], draws: &[bool]) -> Result<f64, EngineError> {
        Self::check_shape(priors.len(), draws.len())?;

        let margin = self.draw_margin();
        let probability = priors
            .windows(2)
            .zip(draws)
            .map(|(pair, tied)| {
                let (a, b) = (pair[0], pair[1]);
                let c = (2.0 * BETA * BETA + a.sigma * a.sigma + b.sigma * b.sigma).sqrt();
                let delta = a.mu - b.mu;
                if *tied {
                    std_normal_cdf((margin - delta) / c) - std_normal_cdf((-margin - delta) / c)
                } else {
                    std_normal_cdf((delta - margin) / c)
                }
            })
            .product();
        Ok(probability)
    }

    /// Performance difference below which two players are considered drawn.
    fn draw_margin(&self) -> f64 {
        std_normal_inv_cdf((self.config.draw_probability + 1.0) / 2.0)
            * std::f64::consts::SQRT_2
            * self.config.beta
    }

    fn check_shape(players: usize, draws: usize) -> Result<(), EngineError> {
        if players < 2 {
            return Err(EngineError::Validation(
                "skill update needs at least two players".to_string(),
            ));
        }
        if draws != players - 1 {
            return Err(EngineError::Validation(format!(
                "expected {} draw flags for {players} players, got {draws}",
                players - 1
            )));
        }
        Ok(())
    }
}

fn std_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

fn std_normal_inv_cdf(p: f64) -> f64 {
    -std::f64::consts::SQRT_2 * erfc_inv(2.0 * p)
}
