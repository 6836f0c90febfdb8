use tracing::debug;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PageDirection {
    Reset,
    Forward,
    Backward,
}

/// One `List` call the controller wants issued. The epoch identifies the
/// request when its result comes back.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PageRequest {
    pub epoch: u64,
    pub token: String,
    pub direction: PageDirection,
}

/// Cursor-stack pagination over opaque continuation tokens.
///
/// `token_stack` holds the token that produced every page before the
/// current one, so `token_stack.len() == page - 1` once a page is loaded.
/// Forward and backward moves only take effect when their page arrives.
#[derive(Debug, Default)]
pub struct Paginator {
    page: usize,
    current_token: String,
    next_token: String,
    token_stack: Vec<String>,
    epoch: u64,
    pending: Option<PageRequest>,
}

impl Paginator {
    pub fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    /// Requests page 1 again. Supersedes any request in flight; the cursor
    /// stack is only dropped once the first page actually arrives.
    pub fn reset(&mut self) -> PageRequest {
        self.epoch += 1;
        self.issue(String::new(), PageDirection::Reset)
    }

    pub fn next(&mut self) -> Option<PageRequest> {
        if self.pending.is_some() || !self.has_more() {
            return None;
        }
        Some(self.issue(self.next_token.clone(), PageDirection::Forward))
    }

    pub fn prev(&mut self) -> Option<PageRequest> {
        if self.pending.is_some() || self.page <= 1 {
            return None;
        }
        let token = self.token_stack.last().cloned().unwrap_or_default();
        Some(self.issue(token, PageDirection::Backward))
    }

    /// Claims the in-flight request a result belongs to. Returns `None`
    /// for results that were superseded.
    pub fn settle(&mut self, epoch: u64) -> Option<PageRequest> {
        let current = epoch == self.epoch
            && self
                .pending
                .as_ref()
                .is_some_and(|pending| pending.epoch == epoch);
        if current {
            return self.pending.take();
        }
        debug!("discarding stale page result epoch={epoch} current={}", self.epoch);
        None
    }

    /// Applies a successfully loaded page.
    pub fn commit(&mut self, request: PageRequest, next_token: String) {
        match request.direction {
            PageDirection::Reset => {
                self.token_stack.clear();
                self.page = 1;
            }
            PageDirection::Forward => {
                self.token_stack.push(std::mem::take(&mut self.current_token));
                self.page += 1;
            }
            PageDirection::Backward => {
                self.token_stack.pop();
                self.page = self.page.saturating_sub(1).max(1);
            }
        }
        self.current_token = request.token;
        self.next_token = next_token;
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn has_more(&self) -> bool {
        !self.next_token.is_empty()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    #[cfg(test)]
    pub fn stack_depth(&self) -> usize {
        self.token_stack.len()
    }

    fn issue(&mut self, token: String, direction: PageDirection) -> PageRequest {
        let request = PageRequest {
            epoch: self.epoch,
            token,
            direction,
        };
        self.pending = Some(request.clone());
        request
    }
}

#[cfg(test)]
mod tests {
    use super::{PageDirection, Paginator};
    use crate::handler::ResourceHandler;
    use crate::model::{ListOptions, ListResult};
    use crate::testing::{FakeHandler, fake_resource};

    fn three_page_handler() -> FakeHandler {
        FakeHandler::new("fake:things", "Things", "th")
            .with_page(
                "",
                vec![
                    fake_resource("a1", &["a1"], &[]),
                    fake_resource("a2", &["a2"], &[]),
                ],
                "A",
            )
            .with_page(
                "A",
                vec![
                    fake_resource("b1", &["b1"], &[]),
                    fake_resource("b2", &["b2"], &[]),
                ],
                "B",
            )
            .with_page("B", vec![fake_resource("c1", &["c1"], &[])], "")
    }

    async fn load(
        handler: &FakeHandler,
        paginator: &mut Paginator,
        request: super::PageRequest,
    ) -> ListResult {
        let options = ListOptions {
            next_token: request.token.clone(),
            ..ListOptions::default()
        };
        let result = handler.list(&options).await.expect("fake page exists");
        let request = paginator
            .settle(request.epoch)
            .expect("request is current");
        paginator.commit(request, result.next_token.clone());
        result
    }

    fn ids(result: &ListResult) -> Vec<String> {
        result
            .resources
            .iter()
            .map(|resource| resource.id().to_string())
            .collect()
    }

    #[tokio::test]
    async fn back_paging_replays_known_tokens() {
        let handler = three_page_handler();
        let mut paginator = Paginator::new();

        let request = paginator.reset();
        load(&handler, &mut paginator, request).await;
        let request = paginator.next().expect("page 2 available");
        let page_two = load(&handler, &mut paginator, request).await;
        let request = paginator.next().expect("page 3 available");
        load(&handler, &mut paginator, request).await;
        assert_eq!(paginator.page(), 3);
        assert_eq!(paginator.stack_depth(), 2);
        assert!(paginator.next().is_none(), "no page after an empty token");

        let request = paginator.prev().expect("page 2 reachable");
        assert_eq!(request.direction, PageDirection::Backward);
        let replayed = load(&handler, &mut paginator, request).await;
        assert_eq!(ids(&replayed), ids(&page_two));
        assert_eq!(paginator.page(), 2);
        assert_eq!(paginator.stack_depth(), 1);

        let request = paginator.prev().expect("page 1 reachable");
        let first = load(&handler, &mut paginator, request).await;
        assert_eq!(ids(&first), vec!["a1", "a2"]);
        assert_eq!(paginator.page(), 1);
        assert!(paginator.prev().is_none());

        for token in handler.list_tokens() {
            assert!(["", "A", "B"].contains(&token.as_str()), "unexpected token {token}");
        }
    }

    #[test]
    fn triggers_are_ignored_while_loading() {
        let mut paginator = Paginator::new();
        let request = paginator.reset();
        let settled = paginator.settle(request.epoch).expect("current");
        paginator.commit(settled, "A".to_string());

        let first = paginator.next().expect("next issued");
        assert!(paginator.is_loading());
        assert!(paginator.next().is_none());
        assert!(paginator.prev().is_none());
        assert_eq!(paginator.page(), 1);

        let request = paginator.settle(first.epoch).expect("current");
        paginator.commit(request, String::new());
        assert_eq!(paginator.page(), 2);
        assert!(!paginator.has_more());
    }

    #[test]
    fn results_from_before_a_reset_are_discarded() {
        let mut paginator = Paginator::new();
        let stale = paginator.reset();
        let fresh = paginator.reset();

        assert!(paginator.settle(stale.epoch).is_none());
        assert!(paginator.settle(fresh.epoch).is_some());
    }

    #[test]
    fn failed_reset_keeps_cursor_stack() {
        let mut paginator = Paginator::new();
        let request = paginator.reset();
        let settled = paginator.settle(request.epoch).expect("current");
        paginator.commit(settled, "A".to_string());
        let forward = paginator.next().expect("next issued");
        let settled = paginator.settle(forward.epoch).expect("current");
        paginator.commit(settled, "B".to_string());

        let refresh = paginator.reset();
        assert_eq!(paginator.page(), 2);
        // the refresh fails: settled, never committed
        assert!(paginator.settle(refresh.epoch).is_some());
        assert_eq!(paginator.page(), 2);
        assert_eq!(paginator.stack_depth(), 1);
        assert!(paginator.has_more());
        assert!(paginator.has_prev());
        assert_eq!(paginator.next().map(|request| request.token), Some("B".to_string()));
    }

    #[test]
    fn failed_forward_load_keeps_current_page() {
        let mut paginator = Paginator::new();
        let request = paginator.reset();
        let settled = paginator.settle(request.epoch).expect("current");
        paginator.commit(settled, "A".to_string());

        let forward = paginator.next().expect("next issued");
        // a failed call settles without committing
        assert!(paginator.settle(forward.epoch).is_some());
        assert_eq!(paginator.page(), 1);
        assert_eq!(paginator.stack_depth(), 0);
        assert!(paginator.has_more());
    }
}
