use std::{
    io::Read,
    path::Path
};

use crate::ui::sprite::{
    ImageStatus,
    SpriteId,
    SpriteKind,
    SpriteStore
};

use super::work_manager::WorkManager;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("IoError, reason='{0}'")]
    IoError(#[from] std::io::Error),

    #[error("Not a PNG image")]
    NotPng,
}

/// Image dimensions from the PNG header. Pixel decoding belongs to the renderer.
pub fn read_png_dimensions<P: AsRef<Path>>(path: P) -> Result<(u32, u32), ImageError> {
    let mut header = [0_u8; 24];
    std::fs::File::open(path)?.read_exact(&mut header)?;
    if header[..8] != PNG_SIGNATURE || &header[12..16] != b"IHDR" {
        return Err(ImageError::NotPng);
    }
    let width = u32::from_be_bytes([header[16], header[17], header[18], header[19]]);
    let height = u32::from_be_bytes([header[20], header[21], header[22], header[23]]);
    Ok((width, height))
}

/// Loads images of `Image` sprites in the background.
#[derive(Debug, Default)]
pub struct LoadImageService {
    posted: usize,
}

impl LoadImageService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts a load for every pending image. Returns how many were posted.
    pub fn scan(&mut self, store: &mut SpriteStore, work: &mut WorkManager) -> usize {
        let pending: Vec<(SpriteId, String)> = store.iter()
            .filter_map(|sprite| match sprite.kind() {
                SpriteKind::Image(image) if image.status() == ImageStatus::Pending => {
                    Some((sprite.id(), image.path().to_string()))
                },
                _ => None,
            })
            .collect();

        self.posted += pending.len();
        for (id, path) in pending.iter() {
            if let Some(SpriteKind::Image(image)) = store.get_mut(*id).map(|sprite| sprite.kind_mut()) {
                image.set_status(ImageStatus::Loading);
            }
            let (id, path) = (*id, path.clone());
            let load_path = path.clone();
            log::debug!("Loading image '{path}' for sprite {id}");
            work.post(
                move || read_png_dimensions(load_path),
                move |result, store: &mut SpriteStore| Self::complete(store, id, &path, result)
            );
        }
        pending.len()
    }

    /// Applied only when the sprite survived and still shows the same path.
    fn complete(store: &mut SpriteStore, id: SpriteId, path: &str, result: Result<(u32, u32), ImageError>) {
        let Some(SpriteKind::Image(image)) = store.get_mut(id).map(|sprite| sprite.kind_mut()) else {
            log::debug!("Image '{path}' finished after sprite {id} was removed");
            return;
        };
        if image.path() != path {
            log::debug!("Image '{path}' superseded on sprite {id}");
            return;
        }
        match result {
            Ok((width, height)) => {
                log::debug!("Image '{path}' loaded, {width}x{height}");
                image.set_status(ImageStatus::Loaded { width, height });
            },
            Err(e) => {
                log::warn!("Could not load image '{path}', reason='{e}'");
                image.set_status(ImageStatus::Failed);
            },
        }
    }

    pub fn posted(&self) -> usize {
        self.posted
    }

    /// Loaded and failed images currently in the store.
    pub fn count_finished(&self, store: &SpriteStore) -> (usize, usize) {
        store.iter().fold((0, 0), |(loaded, failed), sprite| match sprite.kind() {
            SpriteKind::Image(image) => match image.status() {
                ImageStatus::Loaded { .. } => (loaded + 1, failed),
                ImageStatus::Failed => (loaded, failed + 1),
                _ => (loaded, failed),
            },
            _ => (loaded, failed),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::ui::sprite::Image;

    fn write_png_header(name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("sprite_sync_{}_{name}.png", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&PNG_SIGNATURE).unwrap();
        file.write_all(&13_u32.to_be_bytes()).unwrap();
        file.write_all(b"IHDR").unwrap();
        file.write_all(&width.to_be_bytes()).unwrap();
        file.write_all(&height.to_be_bytes()).unwrap();
        file.write_all(&[8, 6, 0, 0, 0]).unwrap();
        path
    }

    fn status(store: &SpriteStore, id: SpriteId) -> ImageStatus {
        match store.get(id).unwrap().kind() {
            SpriteKind::Image(image) => image.status(),
            _ => panic!("not an image"),
        }
    }

    #[test]
    fn test_png_dimensions() {
        let path = write_png_header("dims", 320, 200);
        assert_eq!(read_png_dimensions(&path).unwrap(), (320, 200));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_load_and_fail() {
        let good = write_png_header("good", 16, 8);
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        let ok = store.create(root, SpriteKind::Image(Image::new(good.to_string_lossy()))).unwrap();
        let missing = store.create(root, SpriteKind::Image(Image::new("does/not/exist.png"))).unwrap();

        let mut service = LoadImageService::new();
        let mut work = WorkManager::new();
        assert_eq!(service.scan(&mut store, &mut work), 2);
        assert_eq!(service.scan(&mut store, &mut work), 0, "loading images are not posted twice");
        work.apply_completions(&mut store);

        assert_eq!(status(&store, ok), ImageStatus::Loaded { width: 16, height: 8 });
        assert_eq!(status(&store, missing), ImageStatus::Failed);
        assert_eq!(service.count_finished(&store), (1, 1));
        assert_eq!(service.posted(), 2);
        std::fs::remove_file(good).unwrap();
    }

    #[test]
    fn test_completion_skips_removed_and_changed_sprites() {
        let good = write_png_header("guard", 4, 4);
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        let removed = store.create(root, SpriteKind::Image(Image::new(good.to_string_lossy()))).unwrap();
        let changed = store.create(root, SpriteKind::Image(Image::new(good.to_string_lossy()))).unwrap();

        let mut service = LoadImageService::new();
        let mut work = WorkManager::new();
        service.scan(&mut store, &mut work);
        store.remove(removed).unwrap();
        store.get_mut(changed).unwrap().set_image_path("other.png");

        assert_eq!(work.apply_completions(&mut store), 2);
        assert!(!store.contains(removed));
        assert_eq!(status(&store, changed), ImageStatus::Pending);
        std::fs::remove_file(good).unwrap();
    }
}
