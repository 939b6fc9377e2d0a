//! Fake Adapters - 测试与本地调试用的假上游

mod fake_services;

pub use fake_services::{
    tone_wav, FakeChorusDetector, FakeSourceFetcher, FakeStemSeparator, FakeVoiceConverter,
};
