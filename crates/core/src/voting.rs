//! Round lifecycle: vote collection and reveal on the active round

use crate::models::{ParticipantId, Phase, Room, RoundStatus, VoteValue};
use crate::outcome::Rejection;
use crate::session::Transition;

impl Room {
    /// Record (or replace) a vote on the active round.
    ///
    /// With auto-reveal on, the round is revealed in the same call once
    /// every active participant has a vote recorded.
    pub fn cast_vote(&mut self, participant_id: &ParticipantId, value: VoteValue) -> Transition {
        if self.phase != Phase::Voting {
            return Err(Rejection::WrongPhase {
                expected: Phase::Voting,
                actual: self.phase,
            });
        }

        let voter = self
            .participant(participant_id)
            .ok_or(Rejection::UnknownParticipant)?;
        if !voter.is_active() {
            return Err(Rejection::ObserverCannotVote);
        }

        let round = self.current_round().ok_or(Rejection::NoActiveRound)?;
        if round.status != RoundStatus::Voting {
            return Err(Rejection::RoundRevealed);
        }

        let all_voted = self.config.auto_reveal && {
            let votes = &round.votes;
            self.active_participants()
                .all(|p| p.id == *participant_id || votes.contains(&p.id))
        };

        let round = self.current_round_mut().ok_or(Rejection::NoActiveRound)?;
        round.votes.insert(participant_id.clone(), value);
        if all_voted {
            round.status = RoundStatus::Revealed;
        }
        Ok(())
    }

    /// Reveal the active round whether or not everyone has voted
    pub fn reveal_votes(&mut self) -> Transition {
        if self.phase != Phase::Voting {
            return Err(Rejection::WrongPhase {
                expected: Phase::Voting,
                actual: self.phase,
            });
        }

        let round = self.current_round_mut().ok_or(Rejection::NoActiveRound)?;
        if round.status == RoundStatus::Revealed {
            return Err(Rejection::RoundRevealed);
        }
        round.status = RoundStatus::Revealed;
        Ok(())
    }

    /// Re-check auto-reveal after the participant set changed.
    ///
    /// A leaving or demoted holdout can leave every remaining active
    /// participant voted.
    pub(crate) fn settle_auto_reveal(&mut self) {
        if !self.config.auto_reveal || self.phase != Phase::Voting {
            return;
        }
        let all_voted = match self.current_round() {
            Some(round) if round.status == RoundStatus::Voting && !round.votes.is_empty() => self
                .active_participants()
                .all(|p| round.votes.contains(&p.id)),
            _ => false,
        };
        if all_voted {
            if let Some(round) = self.current_round_mut() {
                round.status = RoundStatus::Revealed;
            }
        }
    }
}
