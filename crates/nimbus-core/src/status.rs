//! Link status reporting
//!
//! The connectivity manager reports each state change to a [`StatusSink`].
//! [`StatusIndicator`] covers the three deployed variants: nothing, a colour
//! indicator (an RGB LED on the device) or a log line.

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::{RgbColor, WebColors};
use log::info;

use crate::link::LinkState;

/// Receives link state transitions. Only called when the state changes.
pub trait StatusSink {
    fn on_transition(&mut self, from: LinkState, to: LinkState);
}

impl<S: StatusSink + ?Sized> StatusSink for &mut S {
    fn on_transition(&mut self, from: LinkState, to: LinkState) {
        (**self).on_transition(from, to)
    }
}

/// A single-colour status light
pub trait Indicator {
    fn show(&mut self, color: Rgb888);
}

/// Colour shown for each link state
pub const fn state_color(state: LinkState) -> Rgb888 {
    match state {
        LinkState::Idle => Rgb888::BLACK,
        LinkState::Connecting => Rgb888::WHITE,
        LinkState::Connected => Rgb888::GREEN,
        LinkState::Reconnecting => Rgb888::CSS_YELLOW,
        LinkState::Disconnected | LinkState::Failed => Rgb888::RED,
    }
}

pub enum StatusIndicator<I> {
    None,
    Visual(I),
    Log,
}

impl<I: Indicator> StatusSink for StatusIndicator<I> {
    fn on_transition(&mut self, from: LinkState, to: LinkState) {
        match self {
            Self::None => {}
            Self::Visual(indicator) => indicator.show(state_color(to)),
            Self::Log => info!("link: {} -> {}", from.label(), to.label()),
        }
    }
}

/// Placeholder for builds without an indicator light
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn show(&mut self, _color: Rgb888) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    struct Recorder(Vec<Rgb888>);

    impl Indicator for Recorder {
        fn show(&mut self, color: Rgb888) {
            self.0.push(color);
        }
    }

    #[test]
    fn visual_indicator_shows_target_state_color() {
        let mut status = StatusIndicator::Visual(Recorder(Vec::new()));
        status.on_transition(LinkState::Idle, LinkState::Connecting);
        status.on_transition(LinkState::Connecting, LinkState::Connected);
        status.on_transition(LinkState::Connected, LinkState::Disconnected);

        let StatusIndicator::Visual(recorder) = status else {
            panic!("variant changed");
        };
        assert_eq!(
            recorder.0,
            [Rgb888::WHITE, Rgb888::GREEN, Rgb888::RED]
        );
    }

    #[test]
    fn none_and_log_variants_accept_transitions() {
        let mut none: StatusIndicator<NoIndicator> = StatusIndicator::None;
        none.on_transition(LinkState::Idle, LinkState::Connecting);

        let mut log: StatusIndicator<NoIndicator> = StatusIndicator::Log;
        log.on_transition(LinkState::Connecting, LinkState::Failed);
    }
}
