pub mod levels;
pub mod pcm;
