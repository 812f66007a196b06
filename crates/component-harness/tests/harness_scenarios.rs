//! End-to-end harness scenarios against the in-process test bed.

use component_harness::backend::testbed::{Dom, Scheduler};
use component_harness::prelude::*;
use component_harness::{logging, BaseHarnessFilters};
use serde::Deserialize;
use serde_json::json;

// ============================================================================
// Sample harnesses
// ============================================================================

#[derive(Debug, Clone)]
struct RowHarness {
    base: HarnessBase,
}

impl ComponentHarness for RowHarness {
    const HOST_SELECTOR: &'static str = "li.row";
    type Filters = StandardFilters;

    fn new(base: HarnessBase) -> Self {
        Self { base }
    }

    fn base(&self) -> &HarnessBase {
        &self.base
    }
}

#[derive(Debug, Clone)]
struct ListHarness {
    base: HarnessBase,
}

impl ComponentHarness for ListHarness {
    const HOST_SELECTOR: &'static str = "ul.app-list";
    type Filters = BaseHarnessFilters;

    fn new(base: HarnessBase) -> Self {
        Self { base }
    }

    fn base(&self) -> &HarnessBase {
        &self.base
    }
}

impl ListHarness {
    async fn rows(&self, filters: StandardFilters) -> HarnessResult<Vec<RowHarness>> {
        self.base().locator_for_all(RowHarness::with(filters)).await
    }

    async fn row_texts(&self) -> HarnessResult<Vec<String>> {
        let mut texts = Vec::new();
        for row in self.rows(StandardFilters::new()).await? {
            texts.push(row.host().text().await?);
        }
        Ok(texts)
    }
}

#[derive(Debug, Clone)]
struct ButtonHarness {
    base: HarnessBase,
}

impl ComponentHarness for ButtonHarness {
    const HOST_SELECTOR: &'static str = "button.app-button";
    type Filters = StandardFilters;

    fn new(base: HarnessBase) -> Self {
        Self { base }
    }

    fn base(&self) -> &HarnessBase {
        &self.base
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CheckboxFilters {
    selector: Option<String>,
    ancestor: Option<String>,
    label: Option<TextMatcher>,
    checked: Option<bool>,
}

impl HarnessFilters for CheckboxFilters {
    fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    fn ancestor(&self) -> Option<&str> {
        self.ancestor.as_deref()
    }
}

#[derive(Debug, Clone)]
struct CheckboxHarness {
    base: HarnessBase,
}

impl ComponentHarness for CheckboxHarness {
    const HOST_SELECTOR: &'static str = "label.app-checkbox";
    type Filters = CheckboxFilters;

    fn new(base: HarnessBase) -> Self {
        Self { base }
    }

    fn base(&self) -> &HarnessBase {
        &self.base
    }

    fn predicate(filters: &CheckboxFilters) -> HarnessPredicate<Self> {
        HarnessPredicate::create(filters)
            .add_option(
                "label",
                filters.label.clone(),
                |harness: Self, label: TextMatcher| async move {
                    Ok(label.matches(&harness.label().await?))
                },
            )
            .add_option(
                "checked",
                filters.checked,
                |harness: Self, checked: bool| async move { Ok(harness.is_checked().await? == checked) },
            )
    }
}

impl CheckboxHarness {
    async fn input(&self) -> HarnessResult<TestElement> {
        self.base().locator_for("input[type=checkbox]").await
    }

    async fn label(&self) -> HarnessResult<String> {
        self.host().text().await
    }

    async fn is_checked(&self) -> HarnessResult<bool> {
        self.input().await?.get_property("checked").await
    }

    async fn toggle(&self) -> HarnessResult<()> {
        self.input().await?.click().await
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn list_of(texts: &[&str]) -> TestBedBackend {
    let _ = logging::init_test_logging();
    let backend = TestBedBackend::new();
    backend
        .mount(
            element("ul")
                .class("app-list")
                .children(texts.iter().map(|text| element("li").class("row").text(text))),
        )
        .unwrap();
    backend
}

fn buttons(disabled: &[bool]) -> TestBedBackend {
    let backend = TestBedBackend::new();
    for (index, is_disabled) in disabled.iter().enumerate() {
        let mut button = element("button")
            .class("app-button")
            .text(&format!("Button {}", index + 1));
        if *is_disabled {
            button = button.attr("disabled", "");
        }
        backend.mount(button).unwrap();
    }
    backend
}

fn checkboxes() -> TestBedBackend {
    let backend = TestBedBackend::new();
    for (label, checked) in [("Apples", true), ("Pears", false), ("Plums", true)] {
        backend
            .mount(
                element("label")
                    .class("app-checkbox")
                    .text(label)
                    .child(element("input").attr("type", "checkbox").checked(checked)),
            )
            .unwrap();
    }
    backend
}

fn reschedule(_dom: &mut Dom, scheduler: &mut Scheduler) {
    scheduler.set_timeout(10, reschedule);
}

// ============================================================================
// Scenarios
// ============================================================================

mod filter_scenarios {
    use super::*;

    #[tokio::test]
    async fn test_text_filter_keeps_matching_rows_in_document_order() {
        let env = list_of(&["First", "Second", "Third", "Fourth", "Third"]).environment();
        let all = env.harness_for_all(RowHarness::query()).await.unwrap();
        let thirds = env
            .harness_for_all(RowHarness::with(StandardFilters::new().with_text("Third")))
            .await
            .unwrap();

        let positions: Vec<usize> = thirds
            .iter()
            .map(|row| {
                all.iter()
                    .position(|candidate| candidate.host().node() == row.host().node())
                    .unwrap()
                    + 1
            })
            .collect();
        assert_eq!(positions, vec![3, 5]);
    }

    #[tokio::test]
    async fn test_disabled_filter_picks_the_disabled_button() {
        let env = buttons(&[false, false, true, false]).environment();
        let disabled = env
            .harness_for_all(ButtonHarness::with(StandardFilters::new().with_disabled(true)))
            .await
            .unwrap();
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].host().text().await.unwrap(), "Button 3");
    }

    #[tokio::test]
    async fn test_disabled_filter_without_disabled_buttons_is_not_found() {
        let env = buttons(&[false, false, false, false]).environment();
        let err = env
            .harness_for(ButtonHarness::with(StandardFilters::new().with_disabled(true)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("disabled = true"));
    }

    #[tokio::test]
    async fn test_omitting_an_option_never_shrinks_the_set() {
        let env = list_of(&["a", "b", "a", "c"]).environment();
        let unfiltered = env.harness_for_all(RowHarness::query()).await.unwrap();
        for filters in [
            StandardFilters::new().with_text("a"),
            StandardFilters::new().with_disabled(false),
            StandardFilters::new().with_text("a").with_disabled(false),
        ] {
            let filtered = env.harness_for_all(RowHarness::with(filters)).await.unwrap();
            assert!(filtered.len() <= unfiltered.len());
        }
        let explicit_none = env
            .harness_for_all(RowHarness::with(StandardFilters {
                text: None,
                disabled: None,
                ..StandardFilters::default()
            }))
            .await
            .unwrap();
        assert_eq!(explicit_none.len(), unfiltered.len());
    }

    #[tokio::test]
    async fn test_custom_filters_through_json() {
        let env = checkboxes().environment();
        let checked = env
            .harness_for_all(CheckboxHarness::with_json(json!({"checked": true})).unwrap())
            .await
            .unwrap();
        assert_eq!(checked.len(), 2);

        let plums = env
            .harness_for(
                CheckboxHarness::with_json(json!({"label": {"regex": "^Pl"}, "checked": true}))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(plums.label().await.unwrap(), "Plums");

        assert!(CheckboxHarness::with_json(json!({"text": "Plums"})).is_err());
    }
}

mod cardinality_scenarios {
    use super::*;

    #[tokio::test]
    async fn test_locator_for_returns_first_consistently() {
        let env = list_of(&["one", "two"]).environment();
        let first = env.locator_for(".row").await.unwrap();
        let again = env.locator_for(".row").await.unwrap();
        assert_eq!(first.node(), again.node());
        assert_eq!(first.text().await.unwrap(), "one");
    }

    #[tokio::test]
    async fn test_exactly_one_reports_ambiguity() {
        let env = list_of(&["one", "two"]).environment();
        match env.locator_for_exactly_one(".row").await.unwrap_err() {
            HarnessError::AmbiguousMatch { count, matches, .. } => {
                assert_eq!(count, 2);
                assert_eq!(matches.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exactly_one_with_a_single_match() {
        let env = buttons(&[false, true]).environment();
        let disabled = env
            .locator_for_exactly_one(ButtonHarness::with(StandardFilters::new().with_disabled(true)))
            .await
            .unwrap();
        assert_eq!(disabled.host().text().await.unwrap(), "Button 2");
    }

    #[tokio::test]
    async fn test_optional_absent_is_none() {
        let env = list_of(&[]).environment();
        assert!(env.locator_for_optional(".row").await.unwrap().is_none());
        assert!(env.locator_for_all(".row").await.unwrap().is_empty());
    }
}

mod composition_scenarios {
    use super::*;

    #[tokio::test]
    async fn test_list_harness_scopes_its_rows() {
        let backend = list_of(&["x", "y"]);
        backend
            .mount(element("ul").class("app-list").child(element("li").class("row").text("z")))
            .unwrap();
        let env = backend.environment();

        let lists = env.harness_for_all(ListHarness::query()).await.unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].row_texts().await.unwrap(), vec!["x", "y"]);
        assert_eq!(lists[1].row_texts().await.unwrap(), vec!["z"]);
    }

    #[tokio::test]
    async fn test_child_scope_narrows_queries() {
        let backend = TestBedBackend::new();
        backend
            .mount(element("section").id("left").child(element("button").class("app-button").text("L")))
            .unwrap();
        backend
            .mount(element("section").id("right").child(element("button").class("app-button").text("R")))
            .unwrap();
        let env = backend.environment();

        let right = env.child_scope("#right").await.unwrap();
        let button = right.harness_for(ButtonHarness::query()).await.unwrap();
        assert_eq!(button.host().text().await.unwrap(), "R");
    }
}

mod interaction_scenarios {
    use super::*;

    #[tokio::test]
    async fn test_removed_element_is_stale_after_click() {
        let backend = TestBedBackend::new();
        backend
            .mount(
                element("button")
                    .class("app-button")
                    .text("Dismiss")
                    .on("click", |dom, _scheduler, event| {
                        dom.remove(event.target);
                    }),
            )
            .unwrap();
        let env = backend.environment();
        let button = env.harness_for(ButtonHarness::query()).await.unwrap();

        button.host().click().await.unwrap();
        let err = button.host().text().await.unwrap_err();
        assert!(err.is_stale());
        assert!(button.host().is_disabled().await.unwrap_err().is_stale());
    }

    #[tokio::test]
    async fn test_async_update_is_visible_after_action() {
        let backend = TestBedBackend::new();
        backend
            .mount(
                element("button")
                    .class("app-button")
                    .text("Save")
                    .on("click", |_dom, scheduler, event| {
                        let target = event.target;
                        scheduler.set_timeout(250, move |dom, _| dom.set_text(target, "Saved"));
                    }),
            )
            .unwrap();
        let env = backend.environment();
        let button = env.harness_for(ButtonHarness::query()).await.unwrap();

        button.host().click().await.unwrap();
        assert_eq!(button.host().text().await.unwrap(), "Saved");
    }

    #[tokio::test]
    async fn test_checkbox_toggle() {
        let env = checkboxes().environment();
        let pears = env
            .harness_for(CheckboxHarness::with(CheckboxFilters {
                label: Some(TextMatcher::exact("Pears")),
                ..CheckboxFilters::default()
            }))
            .await
            .unwrap();
        assert!(!pears.is_checked().await.unwrap());
        pears.toggle().await.unwrap();
        assert!(pears.is_checked().await.unwrap());
    }

    #[tokio::test]
    async fn test_parallel_reads_equal_sequential_reads() {
        let env = list_of(&["a", "b", "c"]).environment();
        let rows = env.harness_for_all(RowHarness::query()).await.unwrap();

        let mut sequential = Vec::new();
        for row in &rows {
            sequential.push(row.host().text().await.unwrap());
        }
        let concurrent = parallel(&env, rows.iter().map(|row| row.host().text()))
            .await
            .unwrap();
        assert_eq!(concurrent, sequential);
    }
}

mod stability_scenarios {
    use super::*;

    #[tokio::test]
    async fn test_endless_timer_exceeds_stability_bound() {
        let backend =
            TestBedBackend::with_config(HarnessConfig::default().with_max_stabilize_cycles(50));
        backend.mount(element("li").class("row")).unwrap();
        backend
            .update(|_dom, scheduler| {
                scheduler.set_timeout(10, reschedule);
            })
            .unwrap();
        let env = backend.environment();

        match env.locator_for(".row").await.unwrap_err() {
            HarnessError::StabilityTimeout {
                backend, cycles, ..
            } => {
                assert_eq!(backend, "testbed");
                assert_eq!(cycles, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_queries_wait_for_pending_renders() {
        let backend = TestBedBackend::new();
        let list = backend.mount(element("ul").class("app-list")).unwrap();
        backend
            .update(move |_dom, scheduler| {
                scheduler.request_animation_frame(move |dom, _| {
                    dom.append(list, element("li").class("row").text("late"));
                });
            })
            .unwrap();
        let env = backend.environment();

        let list = env.harness_for(ListHarness::query()).await.unwrap();
        assert_eq!(list.row_texts().await.unwrap(), vec!["late"]);
    }
}
