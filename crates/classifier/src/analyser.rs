//! Frame Analyser

use std::sync::Arc;

use tensor_pipeline::TensorImage;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::{Category, Classifier, ClassifierError};

/// Receives analysis results
pub trait AnalysisListener: Send {
    fn on_result(&mut self, categories: Vec<Category>);

    fn on_error(&mut self, error: ClassifierError) {
        warn!("Frame analysis failed: {}", error);
    }
}

impl<F> AnalysisListener for F
where
    F: FnMut(Vec<Category>) + Send,
{
    fn on_result(&mut self, categories: Vec<Category>) {
        self(categories)
    }
}

/// Submits frames to an [`ImageAnalyser`] and closes it
pub struct AnalyserHandle<C> {
    sender: mpsc::Sender<TensorImage>,
    classifier: Arc<Mutex<Option<C>>>,
}

impl<C: Classifier> AnalyserHandle<C> {
    /// Queue a frame, waiting for room
    pub async fn submit(&self, frame: TensorImage) -> Result<(), ClassifierError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| ClassifierError::Closed)
    }

    /// Queue a frame unless the analyser is busy; returns whether it was queued
    pub fn try_submit(&self, frame: TensorImage) -> Result<bool, ClassifierError> {
        match self.sender.try_send(frame) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Analyser busy, dropping frame");
                Ok(false)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ClassifierError::Closed),
        }
    }

    /// Stop delivering results and close the classifier
    ///
    /// Waits for an in-flight frame to finish. Idempotent.
    pub async fn close(&self) -> Result<(), ClassifierError> {
        let mut slot = self.classifier.lock().await;
        match slot.take() {
            Some(mut classifier) => {
                info!("Closing image analyser");
                classifier.close()
            }
            None => Ok(()),
        }
    }
}

impl<C> Clone for AnalyserHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

/// Classifies queued frames one at a time
pub struct ImageAnalyser<C> {
    receiver: mpsc::Receiver<TensorImage>,
    classifier: Arc<Mutex<Option<C>>>,
}

impl<C: Classifier + 'static> ImageAnalyser<C> {
    /// Create a handle/analyser pair around a classifier
    pub fn channel(classifier: C, queue_depth: usize) -> (AnalyserHandle<C>, Self) {
        info!("Creating image analyser: queue_depth={}", queue_depth);
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let classifier = Arc::new(Mutex::new(Some(classifier)));
        (
            AnalyserHandle {
                sender: tx,
                classifier: Arc::clone(&classifier),
            },
            Self {
                receiver: rx,
                classifier,
            },
        )
    }

    /// Run the analysis loop
    ///
    /// Ends when every handle is dropped or the analyser is closed. Results
    /// are delivered while the classifier lock is held, so nothing reaches
    /// the listener after `close` returns.
    pub async fn run<L: AnalysisListener>(&mut self, mut listener: L) -> Result<(), ClassifierError> {
        info!("Starting image analyser");

        while let Some(frame) = self.receiver.recv().await {
            let guard = Arc::clone(&self.classifier).lock_owned().await;
            if guard.is_none() {
                debug!("Analyser closed, discarding frame");
                break;
            }

            let (guard, outcome) = tokio::task::spawn_blocking(move || {
                let mut guard = guard;
                let outcome = guard.as_mut().map(|classifier| classifier.classify(&frame));
                (guard, outcome)
            })
            .await
            .map_err(|e| ClassifierError::Inference(format!("analysis task failed: {e}")))?;

            match outcome {
                Some(Ok(categories)) => listener.on_result(categories),
                Some(Err(e)) => listener.on_error(e),
                None => break,
            }
            drop(guard);
        }

        self.receiver.close();
        info!("Image analyser stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Constant {
        closed: Arc<AtomicBool>,
    }

    impl Classifier for Constant {
        fn classify(&mut self, image: &TensorImage) -> Result<Vec<Category>, ClassifierError> {
            Ok(vec![Category::new("width", image.width() as f32)])
        }

        fn close(&mut self) -> Result<(), ClassifierError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn frame(width: u32) -> TensorImage {
        TensorImage::from_rgb(vec![0; width as usize * 3], width, 1).unwrap()
    }

    #[tokio::test]
    async fn test_results_reach_listener_in_order() {
        let closed = Arc::new(AtomicBool::new(false));
        let (handle, mut analyser) = ImageAnalyser::channel(
            Constant {
                closed: Arc::clone(&closed),
            },
            4,
        );

        handle.submit(frame(2)).await.unwrap();
        handle.submit(frame(5)).await.unwrap();
        drop(handle);

        let mut seen = Vec::new();
        analyser
            .run(|categories: Vec<Category>| seen.push(categories[0].score))
            .await
            .unwrap();
        assert_eq!(seen, vec![2.0, 5.0]);
        assert!(!closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_closed_analyser_delivers_nothing() {
        let closed = Arc::new(AtomicBool::new(false));
        let (handle, mut analyser) = ImageAnalyser::channel(
            Constant {
                closed: Arc::clone(&closed),
            },
            4,
        );

        handle.submit(frame(3)).await.unwrap();
        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));

        let mut delivered = 0;
        analyser
            .run(|_: Vec<Category>| delivered += 1)
            .await
            .unwrap();
        assert_eq!(delivered, 0);
        assert!(matches!(handle.submit(frame(1)).await, Err(ClassifierError::Closed)));
    }

    #[tokio::test]
    async fn test_try_submit_reports_full_queue() {
        let (handle, _analyser) = ImageAnalyser::channel(
            Constant {
                closed: Arc::new(AtomicBool::new(false)),
            },
            1,
        );
        assert!(handle.try_submit(frame(1)).unwrap());
        assert!(!handle.try_submit(frame(1)).unwrap());
    }
}
