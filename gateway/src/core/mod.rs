pub mod audio;
pub mod live;

pub use live::{
    BoxedLiveSession, LiveCallbacks, LiveConnector, LiveError, LiveProvider, LiveResult,
    LiveSession, LiveSessionConfig, create_live_connector,
};
