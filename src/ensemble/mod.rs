//! Ensembles of fitted estimators
//!
//! A run that asks for `ensemble = N` finishes with a [`VotingEnsemble`] over
//! the N best distinct candidates instead of a single model.

mod voting;

pub use voting::VotingEnsemble;
