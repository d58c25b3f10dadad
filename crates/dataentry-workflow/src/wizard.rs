//! 分页向导
//!
//! 记录当前页在有序页面序列中的位置

use serde::{Deserialize, Serialize};

/// 分页向导
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wizard {
    number_of_pages: usize,
    current_page: usize,
}

impl Wizard {
    /// 创建从第一页开始的向导
    pub fn new(number_of_pages: usize) -> Self {
        Self::starting_at(number_of_pages, 0)
    }

    /// 创建从指定页开始的向导，越界时停在最后一页
    pub fn starting_at(number_of_pages: usize, current_page: usize) -> Self {
        let number_of_pages = number_of_pages.max(1);
        Self {
            number_of_pages,
            current_page: current_page.min(number_of_pages - 1),
        }
    }

    pub fn move_next(&mut self) {
        if !self.is_last_page() {
            self.current_page += 1;
        }
    }

    pub fn move_previous(&mut self) {
        if !self.is_first_page() {
            self.current_page -= 1;
        }
    }

    pub fn is_first_page(&self) -> bool {
        self.current_page == 0
    }

    pub fn is_last_page(&self) -> bool {
        self.current_page + 1 >= self.number_of_pages
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn number_of_pages(&self) -> usize {
        self.number_of_pages
    }
}
