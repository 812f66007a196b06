//! Locator factory and the per-test session behind it.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, NodeRef};
use crate::config::HarnessConfig;
use crate::element::TestElement;
use crate::harness::ComponentHarness;
use crate::predicate::HarnessPredicate;
use crate::query::{Cardinality, HarnessQuery};
use crate::result::{HarnessError, HarnessResult};

/// State shared by a root environment, every scope derived from it and every
/// element they hand out.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) config: HarnessConfig,
    batch_depth: AtomicUsize,
    settled: AtomicBool,
    stabilizations: AtomicU64,
}

impl Session {
    fn new(backend: Arc<dyn Backend>, config: HarnessConfig) -> Self {
        Self {
            backend,
            config,
            batch_depth: AtomicUsize::new(0),
            settled: AtomicBool::new(false),
            stabilizations: AtomicU64::new(0),
        }
    }

    /// Wait for the backend to settle. Inside a batch whose snapshot is still
    /// known settled this returns immediately.
    pub(crate) async fn stabilize(&self) -> HarnessResult<()> {
        if self.batch_depth.load(Ordering::SeqCst) > 0 && self.settled.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(err) = self.backend.force_stabilize().await {
            tracing::warn!(backend = self.backend.name(), error = %err, "stabilization failed");
            return Err(err);
        }
        self.stabilizations.fetch_add(1, Ordering::SeqCst);
        if self.batch_depth.load(Ordering::SeqCst) > 0 {
            self.settled.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Mark the settled snapshot as outdated after a mutation
    pub(crate) fn invalidate(&self) {
        self.settled.store(false, Ordering::SeqCst);
    }

    fn enter_batch(self: &Arc<Self>) -> BatchGuard {
        self.batch_depth.fetch_add(1, Ordering::SeqCst);
        BatchGuard(Arc::clone(self))
    }
}

/// Leaves the batch on drop, including when the batched future is abandoned
struct BatchGuard(Arc<Session>);

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if self.0.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.settled.store(false, Ordering::SeqCst);
        }
    }
}

/// Locator factory: turns queries into element handles and harnesses.
///
/// A root environment spans one test; scoped environments (for harnesses or
/// from [`HarnessEnvironment::child_scope`]) share its backend and
/// stabilization state and only search beneath their root element.
#[derive(Clone)]
pub struct HarnessEnvironment {
    session: Arc<Session>,
    root: Option<TestElement>,
}

impl fmt::Debug for HarnessEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessEnvironment")
            .field("backend", &self.session.backend.name())
            .field("scope", &self.describe_scope())
            .finish()
    }
}

impl HarnessEnvironment {
    /// Root environment over `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, config: HarnessConfig) -> Self {
        Self {
            session: Arc::new(Session::new(backend, config)),
            root: None,
        }
    }

    /// Environment rooted at `element`, sharing its session
    pub(crate) fn scoped(element: TestElement) -> Self {
        Self {
            session: Arc::clone(element.session()),
            root: Some(element),
        }
    }

    /// Name of the backend in use
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.session.backend.name()
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.session.config
    }

    /// Root element of this scope; `None` for the document root
    #[must_use]
    pub const fn root_element(&self) -> Option<&TestElement> {
        self.root.as_ref()
    }

    /// Number of stability waits that actually reached the backend
    #[must_use]
    pub fn stabilization_count(&self) -> u64 {
        self.session.stabilizations.load(Ordering::SeqCst)
    }

    fn describe_scope(&self) -> String {
        self.root.as_ref().map_or_else(
            || "document root".to_string(),
            |root| format!("element matching '{}'", root.selector()),
        )
    }

    /// Wait until the backend reports no pending UI work
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StabilityTimeout`] when the backend gives up
    pub async fn force_stabilize(&self) -> HarnessResult<()> {
        self.session.stabilize().await
    }

    /// Run `fut` against one settled snapshot.
    ///
    /// Stability is established once up front; nested waits are free until an
    /// element action mutates the UI, after which the next wait is real.
    ///
    /// # Errors
    ///
    /// Returns the initial stabilization failure or whatever `fut` returns
    pub async fn batch<F, T>(&self, fut: F) -> HarnessResult<T>
    where
        F: Future<Output = HarnessResult<T>>,
    {
        let _batch = self.session.enter_batch();
        self.session.stabilize().await?;
        fut.await
    }

    async fn scope_node(&self) -> HarnessResult<NodeRef> {
        match &self.root {
            Some(root) => Ok(root.node()),
            None => self.session.backend.document_root().await,
        }
    }

    async fn locate<Q: HarnessQuery>(
        &self,
        query: Q,
        cardinality: Cardinality,
    ) -> HarnessResult<Vec<Q::Output>> {
        self.batch(async {
            let selector = query.query_selector();
            let scope = self.scope_node().await?;
            let nodes = self
                .session
                .backend
                .raw_find(&selector, &scope)
                .await
                .map_err(|e| match &self.root {
                    Some(root) => root.map_detached(e),
                    None => e,
                })?;
            let candidates: Vec<TestElement> = nodes
                .into_iter()
                .map(|node| TestElement::new(Arc::clone(&self.session), node, selector.as_str()))
                .collect();
            let candidate_count = candidates.len();
            let matches = query.resolve(self, candidates).await?;
            if self.session.config.log_queries {
                tracing::debug!(
                    query = %query.description(),
                    selector = %selector,
                    scope = %self.describe_scope(),
                    candidates = candidate_count,
                    matches = matches.len(),
                    cardinality = %cardinality,
                    "locator query"
                );
            }
            self.apply(&query, cardinality, matches).await
        })
        .await
    }

    async fn locate_one<Q: HarnessQuery>(
        &self,
        query: Q,
        cardinality: Cardinality,
    ) -> HarnessResult<Q::Output> {
        let description = query.description();
        self.locate(query, cardinality)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::HarnessNotFound {
                query: description,
                scope: self.describe_scope(),
            })
    }

    async fn apply<Q: HarnessQuery>(
        &self,
        query: &Q,
        cardinality: Cardinality,
        mut matches: Vec<Q::Output>,
    ) -> HarnessResult<Vec<Q::Output>> {
        let not_found = |description: String| HarnessError::HarnessNotFound {
            query: description,
            scope: self.describe_scope(),
        };
        match cardinality {
            Cardinality::All => Ok(matches),
            Cardinality::Optional => {
                matches.truncate(1);
                Ok(matches)
            }
            Cardinality::First => {
                if matches.is_empty() {
                    return Err(not_found(query.description()));
                }
                matches.truncate(1);
                Ok(matches)
            }
            Cardinality::Nth(index) => {
                if index >= matches.len() {
                    return Err(not_found(format!("{} at index {index}", query.description())));
                }
                Ok(vec![matches.swap_remove(index)])
            }
            Cardinality::ExactlyOne => match matches.len() {
                0 => Err(not_found(query.description())),
                1 => Ok(matches),
                count => {
                    let mut described = Vec::with_capacity(count);
                    for found in &matches {
                        described.push(Q::host_of(found).describe().await?);
                    }
                    Err(HarnessError::AmbiguousMatch {
                        query: query.description(),
                        count,
                        matches: described,
                    })
                }
            },
        }
    }

    /// First match, or `None`
    ///
    /// # Errors
    ///
    /// Fails only on stabilization, backend or predicate errors
    pub async fn locator_for_optional<Q: HarnessQuery>(
        &self,
        query: Q,
    ) -> HarnessResult<Option<Q::Output>> {
        Ok(self
            .locate(query, Cardinality::Optional)
            .await?
            .into_iter()
            .next())
    }

    /// First match in document order
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] when nothing matches
    pub async fn locator_for<Q: HarnessQuery>(&self, query: Q) -> HarnessResult<Q::Output> {
        self.locate_one(query, Cardinality::First).await
    }

    /// The only match
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] on zero matches and
    /// [`HarnessError::AmbiguousMatch`] on more than one
    pub async fn locator_for_exactly_one<Q: HarnessQuery>(
        &self,
        query: Q,
    ) -> HarnessResult<Q::Output> {
        self.locate_one(query, Cardinality::ExactlyOne).await
    }

    /// The match at `index` (zero-based, document order)
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] when there are fewer matches
    pub async fn locator_for_nth<Q: HarnessQuery>(
        &self,
        query: Q,
        index: usize,
    ) -> HarnessResult<Q::Output> {
        self.locate_one(query, Cardinality::Nth(index)).await
    }

    /// Every match in document order
    ///
    /// # Errors
    ///
    /// Fails only on stabilization, backend or predicate errors
    pub async fn locator_for_all<Q: HarnessQuery>(&self, query: Q) -> HarnessResult<Vec<Q::Output>> {
        self.locate(query, Cardinality::All).await
    }

    /// First harness matching `predicate`
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] when nothing matches
    pub async fn harness_for<H: ComponentHarness>(
        &self,
        predicate: HarnessPredicate<H>,
    ) -> HarnessResult<H> {
        self.locator_for(predicate).await
    }

    /// First harness matching `predicate`, or `None`
    ///
    /// # Errors
    ///
    /// Fails only on stabilization, backend or predicate errors
    pub async fn harness_for_optional<H: ComponentHarness>(
        &self,
        predicate: HarnessPredicate<H>,
    ) -> HarnessResult<Option<H>> {
        self.locator_for_optional(predicate).await
    }

    /// Every harness matching `predicate`
    ///
    /// # Errors
    ///
    /// Fails only on stabilization, backend or predicate errors
    pub async fn harness_for_all<H: ComponentHarness>(
        &self,
        predicate: HarnessPredicate<H>,
    ) -> HarnessResult<Vec<H>> {
        self.locator_for_all(predicate).await
    }

    /// Environment rooted at the first element matching `selector`
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HarnessNotFound`] when nothing matches
    pub async fn child_scope(&self, selector: &str) -> HarnessResult<Self> {
        let root = self.locator_for(selector).await?;
        Ok(Self::scoped(root))
    }

    /// Environment rooted at the document, whatever this scope is
    #[must_use]
    pub fn document_root_scope(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            root: None,
        }
    }
}
