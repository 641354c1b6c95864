//! Collaborator seams
//!
//! Mic processing, audio playback, TTS, the debug screens and the backpack
//! light animator live outside this process core. The router and the
//! process talk to them through these traits; every method has a no-op
//! default so partial implementations stay small.

use animproc_core::{ClockTime, FaultCode};
use animproc_wire::{
    CalmPowerMode, MicData, PostAudioEvent, RobotState, SetBackpackLights, StopAllAudioEvents,
    TextToSpeechCancel, TextToSpeechPlay,
};

pub trait MicSystem: Send {
    fn reset_listen_direction(&mut self) {}
    fn process_mic_data(&mut self, _data: &MicData) {}
    fn update(&mut self, _now: ClockTime) {}
}

pub trait AudioPlayback: Send {
    fn update(&mut self, _now: ClockTime) {}
}

pub trait StreamStateManager: Send {
    fn set_on_charger(&mut self, _on_charger: bool) {}
    fn update(&mut self, _now: ClockTime) {}
}

/// Backpack light animator; receives the engine's light requests
pub trait BackpackLights: Send {
    fn set_backpack_animation(&mut self, _lights: &SetBackpackLights) {}
}

pub trait FaultDisplay: Send {
    fn display_fault(&mut self, _fault: FaultCode) {}
}

/// Debug and pairing screens drawn over the face
pub trait ScreenManager: Send {
    fn on_robot_state(&mut self, _state: &RobotState) {}

    /// Power mode to restore once no screen is showing
    fn set_calm_power_mode_on_return(&mut self, _mode: &CalmPowerMode) {}

    /// Whether a pairing or debug screen currently owns the face
    fn is_showing_screen(&self) -> bool {
        false
    }

    fn set_syscon_version(&mut self, _version: &str) {}
}

/// Audio requests coming straight from the engine
pub trait EngineAudioInput: Send {
    fn post_audio_event(&mut self, _msg: &PostAudioEvent) {}
    fn stop_all_audio_events(&mut self, _msg: &StopAllAudioEvents) {}
}

pub trait TextToSpeech: Send {
    fn play(&mut self, _msg: &TextToSpeechPlay) {}
    fn cancel(&mut self, _msg: &TextToSpeechCancel) {}
}

/// Stand-in for every collaborator
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopService;

impl MicSystem for NoopService {}
impl AudioPlayback for NoopService {}
impl StreamStateManager for NoopService {}
impl BackpackLights for NoopService {}
impl FaultDisplay for NoopService {}
impl ScreenManager for NoopService {}
impl EngineAudioInput for NoopService {}
impl TextToSpeech for NoopService {}

/// Every collaborator the process core drives
pub struct Services {
    pub mic: Box<dyn MicSystem>,
    pub audio_playback: Box<dyn AudioPlayback>,
    pub stream_state: Box<dyn StreamStateManager>,
    pub backpack: Box<dyn BackpackLights>,
    pub faults: Box<dyn FaultDisplay>,
    pub screen: Box<dyn ScreenManager>,
    pub audio_input: Box<dyn EngineAudioInput>,
    pub tts: Box<dyn TextToSpeech>,
}

impl Default for Services {
    fn default() -> Self {
        Services {
            mic: Box::new(NoopService),
            audio_playback: Box::new(NoopService),
            stream_state: Box::new(NoopService),
            backpack: Box::new(NoopService),
            faults: Box::new(NoopService),
            screen: Box::new(NoopService),
            audio_input: Box::new(NoopService),
            tts: Box::new(NoopService),
        }
    }
}

impl Services {
    /// Tick the collaborators that run on the process loop
    pub fn update(&mut self, now: ClockTime) {
        self.mic.update(now);
        self.audio_playback.update(now);
        self.stream_state.update(now);
    }
}
