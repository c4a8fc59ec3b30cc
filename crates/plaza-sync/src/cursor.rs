use plaza_types::PageMeta;

/// Pagination state of one list view.
///
/// `page_index` is the highest page applied so far (0 before the first load)
/// and never decreases except through a page 1 refresh. At most one page
/// request is outstanding; a refresh that resets the cursor bumps its epoch so
/// the answer to a request made before the reset is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    page_index: u32,
    total_pages: u32,
    total_records: u64,
    in_flight: Option<u32>,
    epoch: u64,
}

/// Permission to apply one fetched page, handed out by [`PageCursor::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTicket {
    page: u32,
    epoch: u64,
}

impl PageTicket {
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Page 1 replaces the list, later pages are merged into it.
    pub fn replaces(&self) -> bool {
        self.page == 1
    }
}

/// Why a page request was not issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSkip {
    /// Another page of this list is still loading.
    Busy,
    /// The requested page is beyond the last one.
    Exhausted,
    /// The page was applied already.
    AlreadyLoaded,
    /// A newer request (search, filter) replaced this one.
    Superseded,
    /// Nothing changed, e.g. the filter was set to its current value.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    Loaded { page: u32, records: usize },
    Skipped(PageSkip),
    /// The request failed; a notice was raised and the cursor is unchanged.
    Failed,
    /// The list was reset while the request was in flight; the answer was dropped.
    Stale,
}

impl PageOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            page_index: 0,
            total_pages: 1,
            total_records: 0,
            in_flight: None,
            epoch: 0,
        }
    }
}

impl PageCursor {
    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_more(&self) -> bool {
        self.page_index < self.total_pages
    }

    /// The page infinite scroll should ask for, if any.
    pub fn next_page(&self) -> Option<u32> {
        self.has_more().then_some(self.page_index + 1)
    }

    pub fn begin(&mut self, page: u32) -> Result<PageTicket, PageSkip> {
        if self.in_flight.is_some() {
            return Err(PageSkip::Busy);
        }
        if page == 0 || (page > 1 && page > self.total_pages) {
            return Err(PageSkip::Exhausted);
        }
        if page > 1 && page <= self.page_index {
            return Err(PageSkip::AlreadyLoaded);
        }
        self.in_flight = Some(page);
        Ok(PageTicket { page, epoch: self.epoch })
    }

    /// Records a successful fetch. Returns `false` if the ticket predates a reset,
    /// in which case the page must not be applied.
    pub fn finish(&mut self, ticket: PageTicket, meta: PageMeta) -> bool {
        if ticket.epoch != self.epoch {
            return false;
        }
        self.in_flight = None;
        self.total_pages = meta.total_pages.max(1);
        self.total_records = meta.total_records;
        let reached = if ticket.replaces() {
            meta.page_index.max(1)
        } else {
            meta.page_index.max(ticket.page).max(self.page_index)
        };
        self.page_index = reached.min(self.total_pages);
        true
    }

    /// Releases the busy flag after a failed fetch. Returns `false` for a stale ticket.
    pub fn fail(&mut self, ticket: PageTicket) -> bool {
        if ticket.epoch != self.epoch {
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Forgets any outstanding request so that page 1 can be fetched right away.
    /// Loaded pages stay counted until that fetch lands.
    pub fn reset(&mut self) {
        self.in_flight = None;
        self.epoch += 1;
    }
}
