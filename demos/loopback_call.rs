//! Doctor/patient visit over in-process signaling
//!
//! Runs both sides of a call on the simulated platform: connect, switch camera,
//! share the screen, record a few seconds and hang up.

use std::time::Duration;
use telecall::{ConnectionState, EventFilter, GlobalConfig, LoopbackSignaling, Session, TeleCall};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GlobalConfig::development();
    let (doctor_channel, patient_channel) = LoopbackSignaling::pair();

    // Separate platforms: each participant has their own cameras
    let doctor = TeleCall::init_with(config.clone())?
        .session("visit-42")
        .as_doctor(true)
        .enable_video()
        .enable_audio()
        .signaling(doctor_channel)
        .build()?;
    let patient = TeleCall::init_with(config)?
        .session("visit-42")
        .as_doctor(false)
        .enable_video()
        .enable_audio()
        .signaling(patient_channel)
        .build()?;

    let mut status = doctor.events().filtered(EventFilter::status_only());
    tokio::spawn(async move {
        while let Some(event) = status.next().await {
            println!("   📣 doctor: {:?}", event);
        }
    });

    println!("📞 Starting visit");
    patient.start_call().await?;
    doctor.start_call().await?;
    wait_for_connected(&doctor).await?;
    wait_for_connected(&patient).await?;
    println!("✅ Both sides connected");

    doctor.start_recording().await?;

    if let Some(camera) = doctor.switch_camera().await? {
        println!("🔄 Doctor switched to {}", camera.label);
    }

    doctor.start_screen_share().await?;
    println!("🖥️ Doctor is sharing the screen");
    tokio::time::sleep(Duration::from_secs(2)).await;
    doctor.stop_screen_share().await?;

    if let Some(artifact) = doctor.stop_recording().await {
        println!(
            "💾 Recorded {} chunk(s), {} bytes ({})",
            artifact.chunks.len(),
            artifact.size(),
            artifact.mime_type
        );
    }

    doctor.end_call();
    patient.end_call();

    println!("{}", doctor.report().to_json()?);
    Ok(())
}

async fn wait_for_connected(session: &Session) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(10), async {
        while session.state() != ConnectionState::Connected {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await?;
    Ok(())
}
