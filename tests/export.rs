use std::fs::File;
use std::io::Read;

use lipsync::audio::Waveform;
use lipsync::encode::{Encoder, ExportJob, ImageSequenceEncoder};
use lipsync::library::{LibraryStore, ShapeLibrary};
use lipsync::run::{NoProgress, RunControl, Stage};
use lipsync::viseme::{AnimationSequencer, BiasConfiguration, GenerationRequest, Shape};
use lipsync::LibraryError;

fn image_dir(files: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in files {
        std::fs::write(dir.path().join(name), format!("image:{}", name)).unwrap();
    }
    dir
}

fn tone(seconds: f32, sample_rate: u32) -> Waveform {
    let n = (seconds * sample_rate as f32) as usize;
    let samples = (0..n)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let envelope = (std::f32::consts::PI * 2.0 * t).sin().abs();
            envelope * 0.5 * (std::f32::consts::PI * 2.0 * 300.0 * t).sin()
        })
        .collect();
    Waveform::new(samples, sample_rate)
}

#[test]
fn directory_import_survives_store_round_trip() {
    let images = image_dir(&["mouth_Neutral.png", "shape-aa.png", "W_Oo.svg", "notes.txt", "blob.png"]);
    let library = ShapeLibrary::open(images.path()).unwrap();
    assert_eq!(library.catalog.len(), 3);
    assert!(library.catalog.contains(Shape::WOo));

    let root = tempfile::tempdir().unwrap();
    let store = LibraryStore::new(root.path());
    let mut named = library.clone();
    named.manifest.name = "my faces!".into();
    let saved = store.save(&named).unwrap();
    assert_eq!(saved.file_name().unwrap(), "my_faces_.zip");

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].image_count, 3);

    let loaded = store.load("my_faces_").unwrap();
    assert_eq!(loaded.catalog.len(), 3);
    let aa = loaded.catalog.index_of(Shape::Aa).unwrap();
    assert_eq!(&*loaded.catalog.entries()[aa].image.bytes, b"image:shape-aa.png");

    store.delete("my_faces_").unwrap();
    assert!(matches!(store.load("my_faces_"), Err(LibraryError::NotFound(_))));
}

#[test]
fn corrupt_upload_leaves_existing_library_untouched() {
    let images = image_dir(&["neutral.png", "uh.png"]);
    let library = ShapeLibrary::open(images.path()).unwrap();
    let root = tempfile::tempdir().unwrap();
    let store = LibraryStore::new(root.path());
    let mut named = library.clone();
    named.manifest.name = "faces".into();
    let path = store.save(&named).unwrap();
    let before = std::fs::read(&path).unwrap();

    assert!(store.save_bytes("faces", b"not a zip").is_err());
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn generated_track_exports_one_image_per_frame() {
    let images = image_dir(&["neutral.png", "aa.png", "oh.png", "ee.png"]);
    let library = ShapeLibrary::open(images.path()).unwrap();
    let waveform = tone(1.0, 16_000);
    let bias = BiasConfiguration::default();
    let request = GenerationRequest {
        frame_rate: 12,
        seed: Some(5),
        ..Default::default()
    };
    let track = AnimationSequencer::new(&library.catalog, &bias, &request)
        .generate(&waveform, &RunControl::new(), &NoProgress)
        .unwrap();
    assert_eq!(track.frames.len(), 14);

    let out = tempfile::tempdir().unwrap();
    let output = out.path().join("anim.zip");
    let job = ExportJob {
        track: &track,
        catalog: &library.catalog,
        waveform: &waveform,
        audio_name: "tone.wav".into(),
        library_name: library.name().to_string(),
    };
    let exported = std::sync::atomic::AtomicUsize::new(0);
    let progress = |stage: Stage, done: usize, _total: usize| {
        if stage == Stage::Export {
            exported.store(done, std::sync::atomic::Ordering::SeqCst);
        }
    };
    ImageSequenceEncoder::new()
        .encode(&job, &output, &RunControl::new(), &progress)
        .unwrap();
    assert_eq!(exported.into_inner(), 14);

    let mut archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
    let mut text = String::new();
    archive
        .by_name("animation_info.json")
        .unwrap()
        .read_to_string(&mut text)
        .unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(manifest["totalFrames"], 14);
    assert_eq!(manifest["fps"], 12);

    for (i, frame) in track.frames.iter().enumerate() {
        let index = frame.image_index.unwrap();
        let entry = &library.catalog.entries()[index];
        let name = format!("frames/frame_{:04}.{}", i + 1, entry.image.extension());
        let mut bytes = Vec::new();
        archive.by_name(&name).unwrap().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, &*entry.image.bytes);
    }
    // Last frames are buffer padding showing the neutral image.
    let last = track.frames.last().unwrap();
    assert!(last.buffer);
    assert_eq!(last.shape, Shape::Neutral);
}
