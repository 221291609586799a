//! Master node: the operator's haptic device, sampled and driven with force feedback.

pub mod device;
pub mod master_loop;
