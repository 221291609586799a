// Simulated network between master and slave.
// Delay channels, the shared link profile, packet-rate governing and the optional
// perceptual deadband that can further thin out master commands.

pub mod channel;
pub mod deadband;
pub mod governor;
pub mod link;
pub mod message;
pub mod rate_delay;
