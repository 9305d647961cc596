//! Crate root module declarations for the Plum Study game-tree workbench.
//!
//! Exposes the rules engine (board and moves), the game tree with its
//! variation registry and navigator, PGN records, position engines, and the
//! session layer that drives auto-play from a control thread.

pub mod board {
    pub mod algebraic;
    pub mod chess_types;
    pub mod fen;
    pub mod position;
    pub mod render;
}

pub mod moves {
    pub mod apply;
    pub mod attacks;
    pub mod chess_move;
    pub mod generator;
    pub mod san;
}

pub mod tree {
    pub mod display;
    pub mod game_tree;
    pub mod navigator;
    pub mod variation_registry;
}

pub mod record {
    pub mod pgn;
}

pub mod engine {
    pub mod engine_random;
    pub mod engine_trait;
    pub mod uci_client;
}

pub mod session {
    pub mod autoplay;
    pub mod commands;
    pub mod controller;
}

pub mod config;
pub mod errors;
