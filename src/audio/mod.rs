pub mod analysis;
pub mod clock;
pub mod decode;
pub mod device;
pub mod pcm;
