//! Channel slots: the 16 texture inputs of a pass.

use super::render_pass::PassId;
use crate::texture::Texture;

/// Number of channel slots per pass (`iChannel0` .. `iChannel15`).
pub const CHANNEL_COUNT: usize = 16;

/// What a channel slot samples.
#[derive(Debug)]
pub enum Channel {
    /// An image owned by the slot; dropped when the slot is replaced.
    ExternalImage(Texture),
    /// The current output of another pass (or the same one).
    ///
    /// Non-owning: if the pass is removed the slot samples the placeholder.
    Pass(PassId),
}

impl Channel {
    /// The pass this channel reads from, if any.
    pub fn source_pass(&self) -> Option<PassId> {
        match self {
            Channel::Pass(id) => Some(*id),
            Channel::ExternalImage(_) => None,
        }
    }
}

/// The fixed set of channel slots of one pass.
#[derive(Debug)]
pub struct Channels {
    slots: [Option<Channel>; CHANNEL_COUNT],
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl Channels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<&Channel> {
        self.slots.get(index)?.as_ref()
    }

    /// Replace slot `index`, handing back what was there.
    ///
    /// Out-of-range indices leave everything untouched and return the
    /// channel unused as `Err`.
    pub fn set(
        &mut self,
        index: usize,
        channel: Option<Channel>,
    ) -> Result<Option<Channel>, Option<Channel>> {
        match self.slots.get_mut(index) {
            Some(slot) => Ok(std::mem::replace(slot, channel)),
            None => Err(channel),
        }
    }

    /// Iterate over `(slot, channel)` for every occupied slot.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Channel)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|c| (index, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacing_a_slot_returns_the_old_channel() {
        let mut channels = Channels::new();
        assert!(channels.set(3, Some(Channel::Pass(PassId(1)))).unwrap().is_none());
        let old = channels.set(3, Some(Channel::Pass(PassId(2)))).unwrap();
        assert_eq!(old.and_then(|c| c.source_pass()), Some(PassId(1)));
        assert_eq!(channels.get(3).and_then(Channel::source_pass), Some(PassId(2)));
    }

    #[test]
    fn out_of_range_slots_are_rejected() {
        let mut channels = Channels::new();
        let rejected = channels
            .set(CHANNEL_COUNT, Some(Channel::Pass(PassId(0))))
            .unwrap_err();
        assert!(rejected.is_some());
        assert!(channels.get(CHANNEL_COUNT).is_none());
    }

    #[test]
    fn iter_skips_empty_slots() {
        let mut channels = Channels::new();
        channels.set(0, Some(Channel::Pass(PassId(4)))).unwrap();
        channels.set(15, Some(Channel::Pass(PassId(4)))).unwrap();
        let slots: Vec<usize> = channels.iter().map(|(i, _)| i).collect();
        assert_eq!(slots, vec![0, 15]);
    }
}
