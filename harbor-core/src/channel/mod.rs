pub mod model;


pub use model::{
    Ability, Channel, ChannelInfo, ChannelKind, ChannelSettings, ChannelStatus, MultiKeyMode,
};
