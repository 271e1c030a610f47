//! Window capture source, cropping and scene scaling.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use recorder_ipc::{ErrorCode, Rect, Size};

use crate::media::{Handle, ObjectKind, Transform};
use crate::messages::Message;

use super::MediaContext;

pub const WINDOW_CAPTURE_TYPE: &str = "window_capture";
const WINDOW_CAPTURE_NAME: &str = "WindowCapture";
const CROP_FILTER_TYPE: &str = "crop_filter";
pub const CROP_FILTER_NAME: &str = "CropFilter";

/// Fit `content` into `canvas` preserving aspect ratio.
///
/// A canvas at least as wide as the content (by aspect) fits by height and
/// centers horizontally; otherwise it fits by width and centers vertically.
pub fn fit_to_canvas(canvas: Size, content: Size) -> Option<Transform> {
    if canvas.is_empty() || content.is_empty() {
        return None;
    }

    let base_w = canvas.width as f32;
    let base_h = canvas.height as f32;
    let org_w = content.width as f32;
    let org_h = content.height as f32;

    let base_ratio = base_w / base_h;
    let org_ratio = org_w / org_h;

    let transform = if base_ratio >= org_ratio {
        let width = base_h * org_ratio;
        Transform {
            scale: base_h / org_h,
            x: (base_w - width) / 2.0,
            y: 0.0,
        }
    } else {
        let height = base_w / org_ratio;
        Transform {
            scale: base_w / org_w,
            x: 0.0,
            y: (base_h - height) / 2.0,
        }
    };
    Some(transform)
}

impl MediaContext {
    /// Capture the window titled `title`, matched whole-string ignoring case.
    ///
    /// Returns true without doing anything once a capture source exists.
    #[instrument(name = "update_window_capture", skip(self))]
    pub fn update_window_capture(&mut self, title: &str) -> bool {
        if self.capture.is_some() {
            return true;
        }

        let source = match Handle::create(
            &self.engine,
            ObjectKind::Source,
            WINDOW_CAPTURE_TYPE,
            WINDOW_CAPTURE_NAME,
            None,
        ) {
            Ok(source) => source,
            Err(e) => {
                warn!(error = %e, "Failed to create window capture");
                self.emit_error(ErrorCode::ClientWindowCapture, Message::WindowCaptureCreateFailed);
                return false;
            }
        };

        let wanted = title.to_lowercase();
        let windows = self.engine.list_property(source.id(), "window");
        let Some(window) = windows
            .iter()
            .find(|window| window.name.to_lowercase() == wanted)
        else {
            warn!(count = windows.len(), "Window not found");
            self.emit_error(ErrorCode::ClientWindowCapture, Message::WindowNotFound);
            return false;
        };

        let mut current = self.engine.settings(source.id());
        current.insert("window".into(), Value::from(window.value.as_str()));
        self.engine.update(source.id(), &current);
        self.attach_filter(source.id(), CROP_FILTER_TYPE, CROP_FILTER_NAME);

        match &self.scene {
            Some(scene) => {
                for item in self.engine.scene_items(scene.id()) {
                    self.engine.remove_scene_item(item);
                }
                if let Err(e) = self.engine.add_scene_item(scene.id(), source.id()) {
                    warn!(error = %e, "Failed to add capture to scene");
                }
            }
            None => warn!("Scene not created, capture not placed"),
        }

        info!(window = %window.name, "Window capture created");
        self.capture = Some(source);
        self.update_capture_config(true, true);
        true
    }

    /// Crop the capture to `rect` and rescale the scene to the new size.
    pub fn crop_video(&mut self, rect: Rect) {
        let Some(capture) = self.capture.as_ref().map(Handle::id) else {
            debug!("No capture source, ignoring crop");
            return;
        };
        if rect.is_empty() {
            debug!(?rect, "Empty crop rect, ignoring");
            return;
        }
        let Some(filter) = self.engine.find_filter(capture, CROP_FILTER_NAME) else {
            warn!("Crop filter missing");
            return;
        };

        let mut current = self.engine.settings(filter);
        current.insert("relative".into(), Value::Bool(false));
        current.insert("left".into(), Value::from(rect.left));
        current.insert("top".into(), Value::from(rect.top));
        current.insert("cx".into(), Value::from(rect.width));
        current.insert("cy".into(), Value::from(rect.height));
        self.engine.update(filter, &current);

        self.scale_video(rect.size());
    }

    /// Fit content of `size` into the base canvas.
    pub fn scale_video(&mut self, size: Size) {
        self.content_size = size;

        let canvas = Size::new(
            self.config.video.base_width as i32,
            self.config.video.base_height as i32,
        );
        let Some(transform) = fit_to_canvas(canvas, size) else {
            debug!(?size, "Nothing to scale");
            return;
        };
        let Some(scene) = self.scene.as_ref().map(Handle::id) else {
            debug!("No scene, ignoring scale");
            return;
        };

        for item in self.engine.scene_items(scene) {
            self.engine.set_item_transform(item, &transform);
        }
        debug!(?size, ?transform, "Scene scaled");
    }

    pub fn update_capture_config(&mut self, cursor: bool, compatibility: bool) {
        let Some(capture) = self.capture.as_ref().map(Handle::id) else {
            return;
        };

        let mut current = self.engine.settings(capture);
        current.insert("cursor".into(), Value::Bool(cursor));
        current.insert("compatibility".into(), Value::Bool(compatibility));
        self.engine.update(capture, &current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_pillarbox() {
        // 4:3 content on a 16:9 canvas fits by height.
        let t = fit_to_canvas(Size::new(1920, 1080), Size::new(800, 600)).unwrap();
        assert!((t.scale - 1.8).abs() < 1e-5);
        assert!((t.x - 240.0).abs() < 1e-3);
        assert_eq!(t.y, 0.0);
    }

    #[test]
    fn test_fit_letterbox() {
        // 21:9-ish content fits by width.
        let t = fit_to_canvas(Size::new(1920, 1080), Size::new(2560, 1080)).unwrap();
        assert!((t.scale - 0.75).abs() < 1e-5);
        assert_eq!(t.x, 0.0);
        assert!((t.y - 135.0).abs() < 1e-3);
    }

    #[test]
    fn test_fit_same_ratio() {
        let t = fit_to_canvas(Size::new(1920, 1080), Size::new(1280, 720)).unwrap();
        assert!((t.scale - 1.5).abs() < 1e-5);
        assert!(t.x.abs() < 1e-3);
        assert_eq!(t.y, 0.0);
    }

    #[test]
    fn test_fit_empty() {
        assert!(fit_to_canvas(Size::new(1920, 1080), Size::new(0, 600)).is_none());
        assert!(fit_to_canvas(Size::new(0, 0), Size::new(10, 10)).is_none());
    }
}
